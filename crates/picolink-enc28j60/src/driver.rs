use crate::regs::{self, Reg};
use crate::{ChipSelect, Clock, Enc28j60Error, SpiBus, MAX_FRAME_LEN, PHY_BUSY_TIMEOUT_MS};
use log::{debug, info, warn};

/// RX FIFO occupies the low 6 KiB of SRAM, TX the top 2 KiB. Keeping the
/// RX buffer at address zero dodges silicon erratum 5 (ERXST pointer
/// corruption).
pub const RX_BUFFER_START: u16 = 0x0000;
pub const RX_BUFFER_STOP: u16 = 0x17FF;
pub const TX_BUFFER_START: u16 = 0x1800;

/// Derives a locally-administered unicast MAC (`0E:5F:5F:xx:yy:zz`) from
/// the trailing three bytes of a persistent device identifier.
pub fn derive_mac(device_id: &[u8]) -> [u8; 6] {
    assert!(device_id.len() >= 3, "device id must be at least 3 bytes");
    let tail = &device_id[device_id.len() - 3..];
    [0x0e, 0x5f, 0x5f, tail[0], tail[1], tail[2]]
}

#[derive(Debug, Clone)]
pub struct Enc28j60Config {
    /// Station MAC address; derived from `device_id` when `None`.
    pub mac_addr: Option<[u8; 6]>,
    /// Trailing bytes of a persistent board identifier, consumed when no
    /// MAC address is configured.
    pub device_id: [u8; 3],
    pub full_duplex: bool,
    pub multicast_rx: bool,
}

impl Default for Enc28j60Config {
    fn default() -> Enc28j60Config {
        Enc28j60Config {
            mac_addr: None,
            device_id: [0, 0, 0],
            full_duplex: true,
            multicast_rx: false,
        }
    }
}

/// Driver state for one ENC28J60.
///
/// All methods perform synchronous SPI transactions; nothing blocks beyond
/// the post-reset delay in [`Enc28j60::init`] and the bounded PHY busy
/// wait.
pub struct Enc28j60<S, C, K> {
    spi: S,
    cs: C,
    clock: K,
    mac_addr: [u8; 6],
    full_duplex: bool,
    multicast_rx: bool,
    /// Bank bits currently programmed into ECON1, or `0xFFFF` when unknown
    /// (forces the first access to program them).
    current_bank: u16,
    /// Head of the next frame inside the RX FIFO.
    next_packet: u16,
    rev_id: Option<u8>,
}

impl<S: SpiBus, C: ChipSelect, K: Clock> Enc28j60<S, C, K> {
    pub fn new(spi: S, cs: C, clock: K, config: Enc28j60Config) -> Enc28j60<S, C, K> {
        let mac_addr = config
            .mac_addr
            .unwrap_or_else(|| derive_mac(&config.device_id));
        Enc28j60 {
            spi,
            cs,
            clock,
            mac_addr,
            full_duplex: config.full_duplex,
            multicast_rx: config.multicast_rx,
            current_bank: 0xFFFF,
            next_packet: RX_BUFFER_START,
            rev_id: None,
        }
    }

    pub fn mac_addr(&self) -> [u8; 6] {
        self.mac_addr
    }

    /// Resets the chip and brings MAC, PHY and receive logic up. The exact
    /// ordering below is a contract with the silicon; do not reorder.
    pub fn init(&mut self) -> Result<(), Enc28j60Error> {
        self.soft_reset();

        // The reset command needs at least 1 ms before the device answers.
        self.clock.sleep_ms(10);

        self.current_bank = 0xFFFF;
        self.next_packet = RX_BUFFER_START;

        let rev = self.read_reg(regs::EREVID) & regs::EREVID_REV;
        self.rev_id = Some(rev);
        info!("enc28j60: silicon revision 0x{rev:02x}");

        // Disable the CLKOUT pin.
        self.write_reg(regs::ECOCON, regs::ECOCON_DISABLED);

        // Station address; MAADR5 holds the first wire byte.
        self.write_reg(regs::MAADR5, self.mac_addr[0]);
        self.write_reg(regs::MAADR4, self.mac_addr[1]);
        self.write_reg(regs::MAADR3, self.mac_addr[2]);
        self.write_reg(regs::MAADR2, self.mac_addr[3]);
        self.write_reg(regs::MAADR1, self.mac_addr[4]);
        self.write_reg(regs::MAADR0, self.mac_addr[5]);

        // Receive FIFO bounds. ERXRDPT marks where the hardware must stop
        // writing; starting it at the end leaves the whole ring writable.
        self.write_reg_pair(regs::ERXSTL, regs::ERXSTH, RX_BUFFER_START);
        self.write_reg_pair(regs::ERXNDL, regs::ERXNDH, RX_BUFFER_STOP);
        self.write_reg_pair(regs::ERXRDPTL, regs::ERXRDPTH, RX_BUFFER_STOP);

        // Receive filters: unicast to us, valid CRC, hash table, broadcast,
        // and multicast only when asked for.
        let mut filters =
            regs::ERXFCON_UCEN | regs::ERXFCON_CRCEN | regs::ERXFCON_HTEN | regs::ERXFCON_BCEN;
        if self.multicast_rx {
            filters |= regs::ERXFCON_MCEN;
        }
        self.write_reg(regs::ERXFCON, filters);

        // Clear the multicast hash table.
        for reg in [
            regs::EHT0,
            regs::EHT1,
            regs::EHT2,
            regs::EHT3,
            regs::EHT4,
            regs::EHT5,
            regs::EHT6,
            regs::EHT7,
        ] {
            self.write_reg(reg, 0x00);
        }

        // Pull the MAC out of reset and enable frame reception, honouring
        // pause frames in both directions.
        self.write_reg(regs::MACON2, 0x00);
        self.write_reg(
            regs::MACON1,
            regs::MACON1_TXPAUS | regs::MACON1_RXPAUS | regs::MACON1_MARXEN,
        );

        // Auto-pad to 60 bytes, append CRC, check frame length.
        let mut macon3 = regs::MACON3_PADCFG_AUTO | regs::MACON3_TXCRCEN | regs::MACON3_FRMLNEN;
        if self.full_duplex {
            macon3 |= regs::MACON3_FULDPX;
        }
        self.write_reg(regs::MACON3, macon3);

        // Wait indefinitely for a busy medium before transmitting.
        self.write_reg(regs::MACON4, regs::MACON4_DEFER);

        // Maximum frame length, both directions.
        self.write_reg_pair(regs::MAMXFLL, regs::MAMXFLH, MAX_FRAME_LEN as u16);

        // Inter-packet gap timing per the datasheet defaults.
        self.write_reg(
            regs::MABBIPG,
            if self.full_duplex {
                regs::MABBIPG_FULL_DUPLEX
            } else {
                regs::MABBIPG_HALF_DUPLEX
            },
        );
        self.write_reg(regs::MAIPGL, regs::MAIPGL_DEFAULT);
        self.write_reg(regs::MAIPGH, regs::MAIPGH_DEFAULT);
        self.write_reg(regs::MACLCON2, regs::MACLCON2_COLWIN_DEFAULT);

        // PHY duplex must agree with the MAC, and half-duplex loopback is
        // never wanted.
        self.write_phy_reg(
            regs::PHCON1,
            if self.full_duplex {
                regs::PHCON1_PDPXMD
            } else {
                0x0000
            },
        )?;
        self.write_phy_reg(regs::PHCON2, regs::PHCON2_HDLDIS)?;

        // Interrupts: clear whatever is latched, then enable packet-pending
        // and link-change sources.
        self.write_reg(regs::EIR, 0x00);
        self.write_reg(
            regs::EIE,
            regs::EIE_INTIE | regs::EIE_PKTIE | regs::EIE_LINKIE,
        );
        self.write_phy_reg(regs::PHIE, regs::PHIE_PLNKIE | regs::PHIE_PGEIE)?;

        // Let frames in.
        self.set_bits(regs::ECON1, regs::ECON1_RXEN);
        Ok(())
    }

    /// Silicon revision, read once during [`Enc28j60::init`].
    pub fn rev_id(&mut self) -> u8 {
        match self.rev_id {
            Some(rev) => rev,
            None => {
                let rev = self.read_reg(regs::EREVID) & regs::EREVID_REV;
                self.rev_id = Some(rev);
                rev
            }
        }
    }

    pub fn is_link_up(&mut self) -> Result<bool, Enc28j60Error> {
        Ok(self.read_phy_reg(regs::PHSTAT2)? & regs::PHSTAT2_LSTAT != 0)
    }

    /// Consumes a latched link-change event, if one is pending.
    pub fn link_state_changed(&mut self) -> Result<bool, Enc28j60Error> {
        let status = self.read_reg(regs::EIR);
        if status & regs::EIR_LINKIF == 0 {
            return Ok(false);
        }
        // Reading PHIR clears the PHY-side latch; the EIR flag is cleared
        // separately.
        self.read_phy_reg(regs::PHIR)?;
        self.clear_bits(regs::EIR, regs::EIR_LINKIF);
        Ok(true)
    }

    /// Number of frames waiting in the RX FIFO.
    pub fn rx_packet_count(&mut self) -> u8 {
        self.read_reg(regs::EPKTCNT)
    }

    /// Streams `chunks` back-to-back into the TX FIFO and starts
    /// transmission. Returns the frame length on success.
    pub fn send_packet(&mut self, chunks: &[&[u8]]) -> Result<usize, Enc28j60Error> {
        let length: usize = chunks.iter().map(|c| c.len()).sum();
        if length > MAX_FRAME_LEN {
            return Err(Enc28j60Error::FrameTooLong(length));
        }
        if !self.is_link_up()? {
            return Err(Enc28j60Error::LinkDown);
        }

        // Reset the transmit logic before every frame (errata 12), then
        // clear the status flags the reset may leave behind.
        self.set_bits(regs::ECON1, regs::ECON1_TXRST);
        self.clear_bits(regs::ECON1, regs::ECON1_TXRST);
        self.clear_bits(regs::EIR, regs::EIR_TXIF | regs::EIR_TXERIF);

        self.write_reg_pair(regs::ETXSTL, regs::ETXSTH, TX_BUFFER_START);
        self.write_reg_pair(regs::EWRPTL, regs::EWRPTH, TX_BUFFER_START);

        self.write_buffer(chunks);

        // ETXND points at the last payload byte; the per-packet control
        // byte written by write_buffer sits at ETXST, so the payload ends
        // at ETXST + length.
        self.write_reg_pair(regs::ETXNDL, regs::ETXNDH, TX_BUFFER_START + length as u16);

        self.set_bits(regs::ECON1, regs::ECON1_TXRTS);
        debug!("enc28j60: tx {length} bytes");
        Ok(length)
    }

    /// Non-blocking dequeue of one received frame into `buf`.
    ///
    /// Returns `Ok(0)` when nothing is pending. On a bad receive status
    /// vector the frame is discarded, the ring still advances, and
    /// [`Enc28j60Error::Receive`] is returned.
    pub fn receive_packet(&mut self, buf: &mut [u8]) -> Result<usize, Enc28j60Error> {
        if self.rx_packet_count() == 0 {
            return Ok(0);
        }

        // Each frame is preceded by the next-packet pointer and the
        // 4-byte receive status vector, all little-endian.
        self.write_reg_pair(regs::ERDPTL, regs::ERDPTH, self.next_packet);
        let mut header = [0u8; 6];
        self.read_buffer(&mut header);
        self.next_packet = u16::from_le_bytes([header[0], header[1]]);
        let frame_len = usize::from(u16::from_le_bytes([header[2], header[3]]));
        let status = u16::from_le_bytes([header[4], header[5]]);

        let result = if status & regs::RSV_RECEIVED_OK != 0 {
            let len = frame_len.min(MAX_FRAME_LEN).min(buf.len());
            self.read_buffer(&mut buf[..len]);
            Ok(len)
        } else {
            warn!("enc28j60: rx status 0x{status:04x}, frame dropped");
            Err(Enc28j60Error::Receive)
        };

        // Free the consumed region. ERXRDPT must never be programmed to an
        // even address the hardware could be writing at (erratum 14), so it
        // trails the next frame by one byte, wrapping at the ring edge.
        let rdpt = if self.next_packet == RX_BUFFER_START {
            RX_BUFFER_STOP
        } else {
            self.next_packet - 1
        };
        self.write_reg_pair(regs::ERXRDPTL, regs::ERXRDPTH, rdpt);

        // One decrement per dequeued frame, error or not.
        self.set_bits(regs::ECON2, regs::ECON2_PKTDEC);
        result
    }

    fn soft_reset(&mut self) {
        self.cs.select();
        self.spi.write(&[regs::CMD_SRC]);
        self.cs.deselect();
    }

    /// Programs BSEL1:BSEL0 for `reg`'s bank, skipping the SPI traffic when
    /// the cached bank already matches.
    fn select_bank(&mut self, reg: Reg) {
        let bank = reg.bank();
        if bank == self.current_bank {
            return;
        }
        match bank >> 8 {
            0 => self.clear_bits(regs::ECON1, regs::ECON1_BSEL1 | regs::ECON1_BSEL0),
            1 => {
                self.set_bits(regs::ECON1, regs::ECON1_BSEL0);
                self.clear_bits(regs::ECON1, regs::ECON1_BSEL1);
            }
            2 => {
                self.clear_bits(regs::ECON1, regs::ECON1_BSEL0);
                self.set_bits(regs::ECON1, regs::ECON1_BSEL1);
            }
            _ => self.set_bits(regs::ECON1, regs::ECON1_BSEL1 | regs::ECON1_BSEL0),
        }
        self.current_bank = bank;
    }

    fn write_reg(&mut self, reg: Reg, value: u8) {
        self.select_bank(reg);
        self.cs.select();
        self.spi.write(&[regs::CMD_WCR | reg.addr(), value]);
        self.cs.deselect();
    }

    /// Writes a 16-bit value into an L/H register pair, low byte first.
    fn write_reg_pair(&mut self, lo: Reg, hi: Reg, value: u16) {
        self.write_reg(lo, value as u8);
        self.write_reg(hi, (value >> 8) as u8);
    }

    fn read_reg(&mut self, reg: Reg) -> u8 {
        self.select_bank(reg);
        self.cs.select();
        let data = if reg.needs_dummy_read() {
            let mut buf = [regs::CMD_RCR | reg.addr(), 0, 0];
            let tx = buf;
            self.spi.transfer(&tx, &mut buf);
            buf[2]
        } else {
            let mut buf = [regs::CMD_RCR | reg.addr(), 0];
            let tx = buf;
            self.spi.transfer(&tx, &mut buf);
            buf[1]
        };
        self.cs.deselect();
        data
    }

    /// Bit-field set; valid for the common ETH registers only, so no bank
    /// selection is needed.
    fn set_bits(&mut self, reg: Reg, mask: u8) {
        self.cs.select();
        self.spi.write(&[regs::CMD_BFS | reg.addr(), mask]);
        self.cs.deselect();
    }

    /// Bit-field clear; same addressing rules as [`Self::set_bits`].
    fn clear_bits(&mut self, reg: Reg, mask: u8) {
        self.cs.select();
        self.spi.write(&[regs::CMD_BFC | reg.addr(), mask]);
        self.cs.deselect();
    }

    fn write_phy_reg(&mut self, reg: Reg, value: u16) -> Result<(), Enc28j60Error> {
        self.write_reg(regs::MIREGADR, reg.addr());
        self.write_reg(regs::MIWRL, value as u8);
        // Writing the high byte starts the MII transaction.
        self.write_reg(regs::MIWRH, (value >> 8) as u8);
        self.wait_phy_idle()
    }

    fn read_phy_reg(&mut self, reg: Reg) -> Result<u16, Enc28j60Error> {
        self.write_reg(regs::MIREGADR, reg.addr());
        self.write_reg(regs::MICMD, regs::MICMD_MIIRD);
        self.wait_phy_idle()?;
        self.write_reg(regs::MICMD, 0x00);
        let lo = self.read_reg(regs::MIRDL);
        let hi = self.read_reg(regs::MIRDH);
        Ok(u16::from(hi) << 8 | u16::from(lo))
    }

    /// Polls MISTAT.BUSY under a deadline so a wedged MII block cannot hang
    /// the whole host.
    fn wait_phy_idle(&mut self) -> Result<(), Enc28j60Error> {
        let deadline = self.clock.now_ms() + PHY_BUSY_TIMEOUT_MS;
        while self.read_reg(regs::MISTAT) & regs::MISTAT_BUSY != 0 {
            if self.clock.now_ms() > deadline {
                return Err(Enc28j60Error::PhyBusyTimeout);
            }
        }
        Ok(())
    }

    /// One WBM transaction: per-packet control byte, then every chunk
    /// back-to-back under a single chip select.
    fn write_buffer(&mut self, chunks: &[&[u8]]) {
        self.cs.select();
        // Control byte 0: MACON3 decides padding and CRC.
        self.spi.write(&[regs::CMD_WBM, 0x00]);
        for chunk in chunks {
            self.spi.write(chunk);
        }
        self.cs.deselect();
    }

    fn read_buffer(&mut self, buf: &mut [u8]) {
        self.cs.select();
        self.spi.write(&[regs::CMD_RBM]);
        self.spi.read(buf);
        self.cs.deselect();
    }
}
