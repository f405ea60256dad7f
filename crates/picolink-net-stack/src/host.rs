//! The host controller: owns the NIC, the address configuration, the ARP
//! table and the callback registries, and runs the polling loop that
//! drains and dispatches received frames.

use crate::device::{DeviceError, NetDevice};
use crate::view::PacketView;
use crate::{arp, ipv4};
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::mem;
use core::net::Ipv4Addr;
use log::{trace, warn};
use picolink_packetlib::ethernet::MAX_FRAME_LEN;
use picolink_packetlib::{EtherType, EthernetFrame, MacAddr};

/// A registered packet callback. Handlers receive the host (so they can
/// transmit and re-register) and a view of the packet that triggered them;
/// the `Rc` lets a handler remove itself from the registry mid-dispatch.
pub type Handler<D> = Rc<RefCell<dyn FnMut(&mut Host<D>, &PacketView<'_>)>>;

/// Wraps a closure as a [`Handler`].
pub fn handler<D, F>(f: F) -> Handler<D>
where
    F: FnMut(&mut Host<D>, &PacketView<'_>) + 'static,
{
    Rc::new(RefCell::new(f))
}

#[derive(Debug, Clone, Copy)]
pub struct StaticIpv4 {
    pub addr: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostConfig {
    /// Static address configuration; leave `None` when a DHCP client will
    /// configure the host.
    pub static_ipv4: Option<StaticIpv4>,
    pub dns_server: Option<Ipv4Addr>,
}

pub struct Host<D> {
    pub(crate) device: D,
    pub(crate) mac_addr: MacAddr,
    pub(crate) ip_addr: Ipv4Addr,
    pub(crate) net_mask: Ipv4Addr,
    pub(crate) gateway: Ipv4Addr,
    pub(crate) dns_server: Option<Ipv4Addr>,
    pub(crate) ipv4_configured: bool,
    /// IPv4 address (packed, network byte order) to MAC. Entries persist
    /// until overwritten.
    arp_table: BTreeMap<u32, MacAddr>,
    pub(crate) udp_unicast: BTreeMap<u16, Handler<D>>,
    pub(crate) udp_broadcast: BTreeMap<u16, Handler<D>>,
    pub(crate) tcp_unicast: BTreeMap<u16, Handler<D>>,
    /// Datagrams emitted; doubles as the IPv4 identification source, so it
    /// advances once per datagram, never per fragment.
    pub(crate) ip4_tx_count: u32,
    pub(crate) ip4_rx_count: u32,
    rx_buf: Vec<u8>,
    now_ms: u64,
}

impl<D: NetDevice> Host<D> {
    pub fn new(device: D, config: HostConfig) -> Host<D> {
        let mac_addr = MacAddr(device.mac_addr());
        let mut host = Host {
            device,
            mac_addr,
            ip_addr: Ipv4Addr::UNSPECIFIED,
            net_mask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            dns_server: config.dns_server,
            ipv4_configured: false,
            arp_table: BTreeMap::new(),
            udp_unicast: BTreeMap::new(),
            udp_broadcast: BTreeMap::new(),
            tcp_unicast: BTreeMap::new(),
            ip4_tx_count: 0,
            ip4_rx_count: 0,
            rx_buf: vec![0; MAX_FRAME_LEN],
            now_ms: 0,
        };
        if let Some(s) = config.static_ipv4 {
            host.set_ipv4(s.addr, s.mask, s.gateway);
        }
        host
    }

    /// Drains every pending frame from the NIC and dispatches each one up
    /// the stack. `now_ms` is visible to handlers through
    /// [`Host::now_ms`] for the duration of the dispatches.
    pub fn poll(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        loop {
            // The scratch buffer moves out of `self` so the dispatched view
            // can borrow it while handlers mutate the host.
            let mut buf = mem::take(&mut self.rx_buf);
            match self.device.receive(&mut buf) {
                Ok(0) => {
                    self.rx_buf = buf;
                    break;
                }
                Ok(n) => {
                    self.handle_frame(&buf[..n]);
                    self.rx_buf = buf;
                }
                Err(err) => {
                    warn!("eth: receive error: {err}");
                    self.rx_buf = buf;
                }
            }
        }
    }

    /// Routes one frame by EtherType; unknown types are silently ignored.
    pub(crate) fn handle_frame(&mut self, frame: &[u8]) {
        let eth = match EthernetFrame::parse(frame) {
            Ok(eth) => eth,
            Err(err) => {
                trace!("eth: dropping runt frame: {err}");
                return;
            }
        };
        match eth.ethertype {
            EtherType::IPV4 => ipv4::process(self, frame, &eth),
            EtherType::ARP => arp::process(self, &eth),
            other => trace!("eth: ignoring ethertype 0x{:04x}", other.0),
        }
    }

    pub fn mac_addr(&self) -> MacAddr {
        self.mac_addr
    }

    pub fn ip_addr(&self) -> Ipv4Addr {
        self.ip_addr
    }

    pub fn net_mask(&self) -> Ipv4Addr {
        self.net_mask
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    pub fn set_ipv4(&mut self, addr: Ipv4Addr, mask: Ipv4Addr, gateway: Ipv4Addr) {
        self.ip_addr = addr;
        self.net_mask = mask;
        self.gateway = gateway;
        self.ipv4_configured = true;
    }

    pub fn is_ipv4_configured(&self) -> bool {
        self.ipv4_configured
    }

    pub fn set_dns_server(&mut self, addr: Ipv4Addr) {
        self.dns_server = Some(addr);
    }

    pub fn dns_server(&self) -> Option<Ipv4Addr> {
        self.dns_server
    }

    /// Largest IPv4 datagram that fits one frame.
    pub fn eth_mtu(&self) -> usize {
        crate::ETH_MTU
    }

    /// Timestamp passed to the current [`Host::poll`] call.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn ip4_tx_count(&self) -> u32 {
        self.ip4_tx_count
    }

    pub fn ip4_rx_count(&self) -> u32 {
        self.ip4_rx_count
    }

    pub fn is_link_up(&mut self) -> bool {
        self.device.is_link_up()
    }

    pub fn link_state_changed(&mut self) -> bool {
        self.device.link_state_changed()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Registers `handler` for UDP datagrams unicast to `port`; `None`
    /// removes the entry. Changes take effect for the next dispatched
    /// packet.
    pub fn register_udp4_callback(&mut self, port: u16, handler: Option<Handler<D>>) {
        Self::register(&mut self.udp_unicast, port, handler);
    }

    /// Like [`Host::register_udp4_callback`], for datagrams addressed to
    /// 255.255.255.255.
    pub fn register_udp4_bcast_callback(&mut self, port: u16, handler: Option<Handler<D>>) {
        Self::register(&mut self.udp_broadcast, port, handler);
    }

    /// Registers the TCP dispatch hook for `port`. The stack hands over
    /// verified segments and keeps no connection state.
    pub fn register_tcp4_callback(&mut self, port: u16, handler: Option<Handler<D>>) {
        Self::register(&mut self.tcp_unicast, port, handler);
    }

    fn register(table: &mut BTreeMap<u16, Handler<D>>, port: u16, handler: Option<Handler<D>>) {
        match handler {
            Some(h) => {
                table.insert(port, h);
            }
            None => {
                table.remove(&port);
            }
        }
    }

    /// Records `ip -> mac`; accepts the packed integer form too.
    pub fn add_arp_entry(&mut self, ip: impl Into<Ipv4Addr>, mac: MacAddr) {
        self.arp_table.insert(u32::from(ip.into()), mac);
    }

    pub fn arp_entry(&self, ip: impl Into<Ipv4Addr>) -> Option<MacAddr> {
        self.arp_table.get(&u32::from(ip.into())).copied()
    }

    /// True when `ip` shares our subnet.
    pub fn is_local_ip4(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.net_mask);
        u32::from(ip) & mask == u32::from(self.ip_addr) & mask
    }

    /// True when the next hop towards `ip` is already resolvable.
    pub fn is_connected_ip4(&self, ip: Ipv4Addr) -> bool {
        if self.is_local_ip4(ip) {
            self.arp_entry(ip).is_some()
        } else {
            self.arp_entry(self.gateway).is_some()
        }
    }

    /// MAC of the next hop: the peer itself on the local subnet, the
    /// gateway otherwise.
    pub(crate) fn resolve_next_hop(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        if self.is_local_ip4(ip) {
            self.arp_entry(ip)
        } else {
            self.arp_entry(self.gateway)
        }
    }

    /// Takes the identification value for a new datagram and advances the
    /// counter.
    pub(crate) fn next_ident(&mut self) -> u16 {
        let ident = self.ip4_tx_count as u16;
        self.ip4_tx_count = self.ip4_tx_count.wrapping_add(1);
        ident
    }

    pub(crate) fn transmit(&mut self, chunks: &[&[u8]]) -> Result<usize, DeviceError> {
        self.device.send(chunks)
    }

    /// Clones the registered handler out of the table so the registry can
    /// change (including self-removal) while the handler runs.
    pub(crate) fn dispatch(&mut self, handler: Handler<D>, view: &PacketView<'_>) {
        let mut f = handler.borrow_mut();
        (*f)(self, view);
    }
}
