//! Behavioral model of the ENC28J60 seen through its SPI interface.
//!
//! The model decodes the command set byte-by-byte, keeps the banked
//! register file, the PHY registers and the 8 KiB SRAM, and reproduces the
//! side effects the driver relies on: bank selection through ECON1, the
//! dummy byte on MAC/MII reads, indirect PHY access, RX FIFO chaining with
//! next-packet pointers and status vectors, EPKTCNT/PKTDEC bookkeeping and
//! TX capture on TXRTS. Tests drive the real driver against it.

use crate::{ChipSelect, Clock, SpiBus};
use std::cell::RefCell;
use std::rc::Rc;

const SRAM_SIZE: usize = 0x2000;
const BANKS: usize = 4;
const BANK_REGS: usize = 0x20;

const ECON1: usize = 0x1F;
const ECON2: usize = 0x1E;
const EIR: usize = 0x1C;

const EIR_PKTIF: u8 = 0x40;
const EIR_LINKIF: u8 = 0x10;
const EIR_TXIF: u8 = 0x08;
const ECON1_TXRTS: u8 = 0x08;
const ECON2_PKTDEC: u8 = 0x40;
const ECON2_AUTOINC: u8 = 0x80;

const PHIR: usize = 0x13;
const PHSTAT2: usize = 0x11;
const PHSTAT2_LSTAT: u16 = 0x0400;
const PHIR_PLNKIF: u16 = 0x0010;

const RSV_RECEIVED_OK: u16 = 0x0080;

/// Write-side SPI traffic observed on the wire, for sequencing asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOp {
    Reset,
    WriteReg { bank: u8, addr: u8, value: u8 },
    SetBits { addr: u8, mask: u8 },
    ClearBits { addr: u8, mask: u8 },
}

#[derive(Debug, Clone, Copy)]
enum Txn {
    /// Read Control Register; `sent` counts response bytes already shifted
    /// out (MAC/MII reads lead with a dummy byte).
    Rcr { bank: u8, addr: u8, sent: u8 },
    Wcr { bank: u8, addr: u8 },
    Bfs { addr: u8 },
    Bfc { addr: u8 },
    Rbm,
    Wbm,
    /// Opcode consumed, no further bytes expected.
    Done,
}

pub struct ChipSim {
    regs: [[u8; BANK_REGS]; BANKS],
    phy: [u16; BANK_REGS],
    sram: Vec<u8>,
    txn: Option<Txn>,
    pkt_cnt: u8,
    /// Where the next injected frame lands in the RX ring.
    rx_wr: u16,
    link_up: bool,
    /// When set, MISTAT reads report BUSY forever (wedged MII block).
    pub stuck_phy_busy: bool,
    /// Frames captured from the TX FIFO, control byte stripped.
    pub tx_frames: Vec<Vec<u8>>,
    ops: Vec<SimOp>,
}

impl ChipSim {
    fn new() -> ChipSim {
        let mut sim = ChipSim {
            regs: [[0; BANK_REGS]; BANKS],
            phy: [0; BANK_REGS],
            sram: vec![0; SRAM_SIZE],
            txn: None,
            pkt_cnt: 0,
            rx_wr: 0,
            link_up: false,
            stuck_phy_busy: false,
            tx_frames: Vec::new(),
            ops: Vec::new(),
        };
        sim.power_on_defaults();
        sim
    }

    fn power_on_defaults(&mut self) {
        self.regs = [[0; BANK_REGS]; BANKS];
        self.phy = [0; BANK_REGS];
        self.regs[0][ECON2] = ECON2_AUTOINC;
        self.pkt_cnt = 0;
        self.rx_wr = 0;
        self.txn = None;
        if self.link_up {
            self.phy[PHSTAT2] = PHSTAT2_LSTAT;
        }
    }

    /// Raises or drops the link and latches the PHY/EIR link-change flags,
    /// as the real PHY interrupt logic does.
    pub fn set_link(&mut self, up: bool) {
        if self.link_up != up {
            self.phy[PHIR] |= PHIR_PLNKIF;
            self.regs[0][EIR] |= EIR_LINKIF;
        }
        self.link_up = up;
        if up {
            self.phy[PHSTAT2] |= PHSTAT2_LSTAT;
        } else {
            self.phy[PHSTAT2] &= !PHSTAT2_LSTAT;
        }
    }

    /// Appends a good frame to the RX FIFO.
    pub fn inject_frame(&mut self, frame: &[u8]) {
        self.inject_frame_with_status(frame, RSV_RECEIVED_OK);
    }

    /// Appends a frame with an arbitrary receive status vector, so tests
    /// can exercise the error path.
    pub fn inject_frame_with_status(&mut self, frame: &[u8], status: u16) {
        let (start, stop) = (self.erxst(), self.erxnd());
        // Frames are chained: 2-byte next-packet pointer, 2-byte length,
        // 2-byte status, payload, with the next pointer kept even-aligned
        // the way the silicon writes it.
        let total = 6 + frame.len() as u16;
        let mut next = self.rx_wr.wrapping_add(total);
        if next & 1 != 0 {
            next += 1;
        }
        let span = stop - start + 1;
        if next > stop {
            next = start + (next - stop - 1) % span;
        }

        let mut at = self.rx_wr;
        for byte in next
            .to_le_bytes()
            .into_iter()
            .chain((frame.len() as u16).to_le_bytes())
            .chain(status.to_le_bytes())
            .chain(frame.iter().copied())
        {
            self.sram[usize::from(at)] = byte;
            at = if at == stop { start } else { at + 1 };
        }

        self.rx_wr = next;
        self.pkt_cnt = self.pkt_cnt.saturating_add(1);
        self.regs[0][EIR] |= EIR_PKTIF;
    }

    pub fn op_log(&self) -> &[SimOp] {
        &self.ops
    }

    /// Register file contents, bypassing the SPI protocol. Common
    /// registers (0x1B..=0x1F) live in bank 0.
    pub fn reg(&self, bank: u8, addr: u8) -> u8 {
        let bank = if addr >= 0x1B { 0 } else { bank };
        self.regs[usize::from(bank)][usize::from(addr)]
    }

    pub fn phy_reg(&self, addr: u8) -> u16 {
        self.phy[usize::from(addr)]
    }

    pub fn packet_count(&self) -> u8 {
        self.pkt_cnt
    }

    /// Current ERXRDPT, the boundary the RX hardware must not write past.
    pub fn erxrdpt(&self) -> u16 {
        self.reg16(0, 0x0C)
    }

    fn erxst(&self) -> u16 {
        self.reg16(0, 0x08)
    }

    fn erxnd(&self) -> u16 {
        self.reg16(0, 0x0A)
    }

    fn reg16(&self, bank: u8, lo_addr: u8) -> u16 {
        u16::from_le_bytes([self.reg(bank, lo_addr), self.reg(bank, lo_addr + 1)])
    }

    fn bank(&self) -> u8 {
        self.regs[0][ECON1] & 0x03
    }

    /// MAC and MII registers answer with a leading dummy byte.
    fn is_mac_mii(bank: u8, addr: u8) -> bool {
        match bank {
            2 => addr <= 0x19,
            3 => addr <= 0x05 || addr == 0x0A,
            _ => false,
        }
    }

    fn chip_select(&mut self) {
        self.txn = None;
    }

    fn chip_deselect(&mut self) {
        self.txn = None;
    }

    fn clock_byte(&mut self, mosi: u8) -> u8 {
        let Some(txn) = self.txn else {
            self.txn = Some(self.decode_opcode(mosi));
            return 0;
        };
        match txn {
            Txn::Rcr { bank, addr, sent } => {
                if sent == 0 && Self::is_mac_mii(bank, addr) {
                    self.txn = Some(Txn::Rcr {
                        bank,
                        addr,
                        sent: 1,
                    });
                    return 0; // dummy byte
                }
                self.txn = Some(Txn::Done);
                self.read_reg_value(bank, addr)
            }
            Txn::Wcr { bank, addr } => {
                self.txn = Some(Txn::Done);
                self.write_reg_value(bank, addr, mosi);
                0
            }
            Txn::Bfs { addr } => {
                self.txn = Some(Txn::Done);
                self.bit_field_set(addr, mosi);
                0
            }
            Txn::Bfc { addr } => {
                self.txn = Some(Txn::Done);
                self.ops.push(SimOp::ClearBits { addr, mask: mosi });
                let bank = if addr >= 0x1B { 0 } else { self.bank() };
                self.regs[usize::from(bank)][usize::from(addr)] &= !mosi;
                0
            }
            Txn::Rbm => {
                let at = self.reg16(0, 0x00); // ERDPT
                let byte = self.sram[usize::from(at)];
                self.advance_erdpt(at);
                byte
            }
            Txn::Wbm => {
                let at = self.reg16(0, 0x02); // EWRPT
                self.sram[usize::from(at)] = mosi;
                let next = if usize::from(at) + 1 == SRAM_SIZE {
                    0
                } else {
                    at + 1
                };
                self.regs[0][0x02] = next as u8;
                self.regs[0][0x03] = (next >> 8) as u8;
                0
            }
            Txn::Done => 0,
        }
    }

    fn decode_opcode(&mut self, byte: u8) -> Txn {
        let addr = byte & 0x1F;
        match byte >> 5 {
            0b000 => Txn::Rcr {
                bank: if addr >= 0x1B { 0 } else { self.bank() },
                addr,
                sent: 0,
            },
            0b001 => Txn::Rbm,
            0b010 => Txn::Wcr {
                bank: if addr >= 0x1B { 0 } else { self.bank() },
                addr,
            },
            0b011 => Txn::Wbm,
            0b100 => Txn::Bfs { addr },
            0b101 => Txn::Bfc { addr },
            _ => {
                // System reset command.
                self.ops.push(SimOp::Reset);
                self.power_on_defaults();
                Txn::Done
            }
        }
    }

    /// RBM auto-increments ERDPT, wrapping at the RX ring edge.
    fn advance_erdpt(&mut self, at: u16) {
        let next = if at == self.erxnd() {
            self.erxst()
        } else {
            (at + 1) % SRAM_SIZE as u16
        };
        self.regs[0][0x00] = next as u8;
        self.regs[0][0x01] = (next >> 8) as u8;
    }

    fn read_reg_value(&mut self, bank: u8, addr: u8) -> u8 {
        match (bank, addr) {
            // MISTAT: BUSY reflects (possibly wedged) MII activity; the
            // model itself completes PHY operations instantly.
            (3, 0x0A) => u8::from(self.stuck_phy_busy),
            // EPKTCNT
            (1, 0x19) => self.pkt_cnt,
            // EREVID: a B7 part.
            (3, 0x12) => 0x06,
            _ => self.reg(bank, addr),
        }
    }

    fn write_reg_value(&mut self, bank: u8, addr: u8, value: u8) {
        let bank = if addr >= 0x1B { 0 } else { bank };
        self.ops.push(SimOp::WriteReg { bank, addr, value });
        self.regs[usize::from(bank)][usize::from(addr)] = value;
        match (bank, addr) {
            // ERXSTL/ERXSTH: the RX write pointer follows ERXST while the
            // FIFO is empty.
            (0, 0x08) | (0, 0x09) => self.rx_wr = self.erxst(),
            // MIWRH: completes an indirect PHY write.
            (2, 0x17) => {
                let miregadr = usize::from(self.reg(2, 0x14) & 0x1F);
                let value = u16::from(value) << 8 | u16::from(self.reg(2, 0x16));
                self.phy[miregadr] = value;
            }
            // MICMD.MIIRD: latches the addressed PHY register into MIRD.
            (2, 0x12) if value & 0x01 != 0 => {
                let miregadr = usize::from(self.reg(2, 0x14) & 0x1F);
                let value = self.phy[miregadr];
                self.regs[2][0x18] = value as u8;
                self.regs[2][0x19] = (value >> 8) as u8;
                // Reading PHIR clears the latched PHY interrupt flags.
                if miregadr == PHIR {
                    self.phy[PHIR] = 0;
                }
            }
            _ => {}
        }
    }

    fn bit_field_set(&mut self, addr: u8, mask: u8) {
        self.ops.push(SimOp::SetBits { addr, mask });
        match addr as usize {
            ECON2 if mask & ECON2_PKTDEC != 0 => {
                // PKTDEC is self-clearing and only counts down.
                self.pkt_cnt = self.pkt_cnt.saturating_sub(1);
                self.regs[0][ECON2] |= mask & !ECON2_PKTDEC;
            }
            ECON1 if mask & ECON1_TXRTS != 0 => {
                self.regs[0][ECON1] |= mask & !ECON1_TXRTS;
                self.transmit();
            }
            addr => {
                let bank = if addr >= 0x1B { 0 } else { usize::from(self.bank()) };
                self.regs[bank][addr] |= mask;
            }
        }
    }

    /// TXRTS: captures the frame between ETXST (control byte) and ETXND
    /// inclusive, then reports completion.
    fn transmit(&mut self) {
        let start = usize::from(self.reg16(0, 0x04));
        let end = usize::from(self.reg16(0, 0x06));
        if end >= start + 1 && end < SRAM_SIZE {
            self.tx_frames.push(self.sram[start + 1..=end].to_vec());
        }
        self.regs[0][EIR] |= EIR_TXIF;
    }
}

/// Shared handle to one simulated chip; clones talk to the same silicon.
#[derive(Clone)]
pub struct SimHandle {
    chip: Rc<RefCell<ChipSim>>,
}

impl SimHandle {
    #[allow(clippy::new_without_default)]
    pub fn new() -> SimHandle {
        SimHandle {
            chip: Rc::new(RefCell::new(ChipSim::new())),
        }
    }

    pub fn spi(&self) -> SimSpi {
        SimSpi(self.clone())
    }

    pub fn cs(&self) -> SimCs {
        SimCs(self.clone())
    }

    /// Direct access to the chip model, for test setup and asserts.
    pub fn with<R>(&self, f: impl FnOnce(&mut ChipSim) -> R) -> R {
        f(&mut self.chip.borrow_mut())
    }
}

/// SPI bus endpoint of a [`SimHandle`].
pub struct SimSpi(SimHandle);

impl SpiBus for SimSpi {
    fn write(&mut self, data: &[u8]) {
        let mut chip = self.0.chip.borrow_mut();
        for &byte in data {
            chip.clock_byte(byte);
        }
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) {
        let mut chip = self.0.chip.borrow_mut();
        for (i, &byte) in tx.iter().enumerate() {
            rx[i] = chip.clock_byte(byte);
        }
    }

    fn read(&mut self, data: &mut [u8]) {
        let mut chip = self.0.chip.borrow_mut();
        for byte in data.iter_mut() {
            *byte = chip.clock_byte(0);
        }
    }
}

/// Chip-select endpoint of a [`SimHandle`].
pub struct SimCs(SimHandle);

impl ChipSelect for SimCs {
    fn select(&mut self) {
        self.0.chip.borrow_mut().chip_select();
    }

    fn deselect(&mut self) {
        self.0.chip.borrow_mut().chip_deselect();
    }
}

/// Deterministic clock: sleeping advances it, and every query ticks it one
/// millisecond so driver busy-wait loops always make progress in tests.
pub struct SimClock {
    now: u64,
}

impl SimClock {
    #[allow(clippy::new_without_default)]
    pub fn new() -> SimClock {
        SimClock { now: 0 }
    }
}

impl Clock for SimClock {
    fn sleep_ms(&mut self, ms: u32) {
        self.now += u64::from(ms);
    }

    fn now_ms(&mut self) -> u64 {
        self.now += 1;
        self.now
    }
}
