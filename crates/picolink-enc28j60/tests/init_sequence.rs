use picolink_enc28j60::sim::{SimClock, SimCs, SimHandle, SimOp, SimSpi};
use picolink_enc28j60::{derive_mac, Enc28j60, Enc28j60Config};

fn nic(sim: &SimHandle, config: Enc28j60Config) -> Enc28j60<SimSpi, SimCs, SimClock> {
    Enc28j60::new(sim.spi(), sim.cs(), SimClock::new(), config)
}

#[test]
fn init_issues_soft_reset_before_any_register_write() {
    let sim = SimHandle::new();
    let mut dev = nic(&sim, Enc28j60Config::default());
    dev.init().expect("init");

    let first = sim.with(|c| c.op_log().first().copied());
    assert_eq!(first, Some(SimOp::Reset));
}

#[test]
fn init_programs_mac_address_in_reverse_register_order() {
    let sim = SimHandle::new();
    let mac = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
    let mut dev = nic(
        &sim,
        Enc28j60Config {
            mac_addr: Some(mac),
            ..Enc28j60Config::default()
        },
    );
    dev.init().expect("init");

    // MAADR5 (bank 3, 0x04) holds the first wire byte, MAADR0 (0x01) the
    // last.
    sim.with(|c| {
        assert_eq!(c.reg(3, 0x04), mac[0], "MAADR5");
        assert_eq!(c.reg(3, 0x05), mac[1], "MAADR4");
        assert_eq!(c.reg(3, 0x02), mac[2], "MAADR3");
        assert_eq!(c.reg(3, 0x03), mac[3], "MAADR2");
        assert_eq!(c.reg(3, 0x00), mac[4], "MAADR1");
        assert_eq!(c.reg(3, 0x01), mac[5], "MAADR0");
    });
}

#[test]
fn init_rx_fifo_bounds_and_filters() {
    let sim = SimHandle::new();
    let mut dev = nic(&sim, Enc28j60Config::default());
    dev.init().expect("init");

    sim.with(|c| {
        assert_eq!(c.reg(0, 0x08), 0x00, "ERXSTL");
        assert_eq!(c.reg(0, 0x09), 0x00, "ERXSTH");
        assert_eq!(c.reg(0, 0x0A), 0xFF, "ERXNDL");
        assert_eq!(c.reg(0, 0x0B), 0x17, "ERXNDH");
        assert_eq!(c.erxrdpt(), 0x17FF, "ERXRDPT starts at the ring end");
        // unicast | crc | hash table | broadcast
        assert_eq!(c.reg(1, 0x18), 0x80 | 0x20 | 0x04 | 0x01, "ERXFCON");
    });
}

#[test]
fn init_multicast_filter_follows_config() {
    let sim = SimHandle::new();
    let mut dev = nic(
        &sim,
        Enc28j60Config {
            multicast_rx: true,
            ..Enc28j60Config::default()
        },
    );
    dev.init().expect("init");
    sim.with(|c| assert_eq!(c.reg(1, 0x18), 0x80 | 0x20 | 0x04 | 0x02 | 0x01));
}

#[test]
fn init_full_duplex_configures_mac_and_phy() {
    let sim = SimHandle::new();
    let mut dev = nic(&sim, Enc28j60Config::default());
    dev.init().expect("init");

    sim.with(|c| {
        // PADCFG auto | TXCRCEN | FRMLNEN | FULDPX
        assert_eq!(c.reg(2, 0x02), 0xA0 | 0x10 | 0x02 | 0x01, "MACON3");
        assert_eq!(c.reg(2, 0x04), 0x15, "MABBIPG full duplex");
        assert_eq!(c.phy_reg(0x00), 0x0100, "PHCON1.PDPXMD");
        assert_eq!(c.phy_reg(0x10), 0x0100, "PHCON2.HDLDIS");
    });
}

#[test]
fn init_half_duplex_configures_mac_and_phy() {
    let sim = SimHandle::new();
    let mut dev = nic(
        &sim,
        Enc28j60Config {
            full_duplex: false,
            ..Enc28j60Config::default()
        },
    );
    dev.init().expect("init");

    sim.with(|c| {
        assert_eq!(c.reg(2, 0x02), 0xA0 | 0x10 | 0x02, "MACON3 without FULDPX");
        assert_eq!(c.reg(2, 0x04), 0x12, "MABBIPG half duplex");
        assert_eq!(c.phy_reg(0x00), 0x0000, "PHCON1");
    });
}

#[test]
fn init_enables_interrupts_and_reception() {
    let sim = SimHandle::new();
    let mut dev = nic(&sim, Enc28j60Config::default());
    dev.init().expect("init");

    sim.with(|c| {
        assert_eq!(c.reg(0, 0x1B), 0x80 | 0x40 | 0x10, "EIE");
        assert_eq!(c.phy_reg(0x12), 0x0010 | 0x0002, "PHIE");
        assert_ne!(c.reg(0, 0x1F) & 0x04, 0, "ECON1.RXEN");
        // Frame length limit: 1518.
        assert_eq!(c.reg(2, 0x0A), 0xEE, "MAMXFLL");
        assert_eq!(c.reg(2, 0x0B), 0x05, "MAMXFLH");
    });
}

#[test]
fn rev_id_is_read_during_init() {
    let sim = SimHandle::new();
    let mut dev = nic(&sim, Enc28j60Config::default());
    dev.init().expect("init");
    assert_eq!(dev.rev_id(), 0x06);
}

#[test]
fn mac_is_derived_from_device_id_when_not_configured() {
    assert_eq!(
        derive_mac(&[0xaa, 0xbb, 0x01, 0x02, 0x03]),
        [0x0e, 0x5f, 0x5f, 0x01, 0x02, 0x03]
    );

    let sim = SimHandle::new();
    let dev = nic(
        &sim,
        Enc28j60Config {
            device_id: [0x07, 0x08, 0x09],
            ..Enc28j60Config::default()
        },
    );
    assert_eq!(dev.mac_addr(), [0x0e, 0x5f, 0x5f, 0x07, 0x08, 0x09]);
}
