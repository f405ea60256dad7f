//! DHCPv4 client (RFC 2131).
//!
//! A single state machine driven from two edges: the owner's periodic
//! [`Dhcp4Client::poll`] tick and the UDP callback the client registers on
//! port 68 (broadcast while acquiring, unicast while renewing). The client
//! is shared as `Rc<RefCell<_>>` so the registered callback and the owner
//! hold the same instance.

use crate::device::NetDevice;
use crate::host::{handler, Host};
use crate::view::PacketView;
use crate::ETH_MTU;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::net::Ipv4Addr;
use log::{debug, info, warn};
use picolink_packetlib::dhcp::{self, msg_type, opt, DhcpMessage};
use picolink_packetlib::MacAddr;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

/// How long to wait for an OFFER before starting over.
const OFFER_TIMEOUT_S: u64 = 5;
/// How long to wait for the ACK of a selecting REQUEST.
const ACK_TIMEOUT_S: u64 = 10;
/// How long to wait for the ACK of a renewing REQUEST before retrying.
const RENEW_REPLY_TIMEOUT_S: u64 = 5;
/// Renewal attempts before falling back to reacquisition.
const MAX_RENEW_ATTEMPTS: u32 = 3;
const DEFAULT_LEASE_S: u32 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dhcp4State {
    Init,
    AwaitOffer,
    Selecting,
    Bound,
    RenewingInit,
    Renewing,
}

#[derive(Debug, Clone, Default)]
pub struct Dhcp4Config {
    /// Hostname announced in option 12; omitted when empty.
    pub hostname: Option<String>,
    /// Seed for transaction-id generation. Feed real entropy here (boot
    /// counter, jitter measurement); the default gives a fixed sequence.
    pub xid_seed: u64,
}

pub struct Dhcp4Client {
    state: Dhcp4State,
    rng: SmallRng,
    xid: u32,
    yiaddr: Ipv4Addr,
    siaddr: Ipv4Addr,
    /// When the current exchange started, in wall seconds.
    init_time: u64,
    /// When the current lease was applied, in wall seconds.
    bound_time: u64,
    lease_seconds: u32,
    renewal_seconds: u32,
    rebinding_seconds: u32,
    renew_attempt_cnt: u32,
    hostname: Option<String>,
    param_request: [u8; 3],
}

impl Dhcp4Client {
    pub fn new(config: Dhcp4Config) -> Dhcp4Client {
        Dhcp4Client {
            state: Dhcp4State::Init,
            rng: SmallRng::seed_from_u64(config.xid_seed),
            xid: 0,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            init_time: 0,
            bound_time: 0,
            lease_seconds: 0,
            renewal_seconds: 0,
            rebinding_seconds: 0,
            renew_attempt_cnt: 0,
            hostname: config.hostname,
            param_request: [opt::SUBNET_MASK, opt::ROUTER, opt::DNS_SERVERS],
        }
    }

    /// The client in the shape [`Dhcp4Client::poll`] consumes.
    pub fn shared(config: Dhcp4Config) -> Rc<RefCell<Dhcp4Client>> {
        Rc::new(RefCell::new(Dhcp4Client::new(config)))
    }

    pub fn state(&self) -> Dhcp4State {
        self.state
    }

    pub fn lease_seconds(&self) -> u32 {
        self.lease_seconds
    }

    pub fn renewal_seconds(&self) -> u32 {
        self.renewal_seconds
    }

    pub fn rebinding_seconds(&self) -> u32 {
        self.rebinding_seconds
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// One cooperative tick; at most one state transition happens per
    /// call. `now_ms` must come from the same clock as [`Host::poll`].
    pub fn poll<D: NetDevice>(this: &Rc<RefCell<Dhcp4Client>>, host: &mut Host<D>, now_ms: u64) {
        let now = now_ms / 1000;
        let state = this.borrow().state;
        match state {
            Dhcp4State::Init => {
                if !host.is_link_up() {
                    return;
                }
                let data = {
                    let mut c = this.borrow_mut();
                    c.init_time = now;
                    c.xid = c.rng.next_u32();
                    c.renew_attempt_cnt = 0;
                    info!("dhcp4: discover, xid 0x{:08x}", c.xid);
                    c.make_discover(host.mac_addr())
                };
                match host.send_udp4_bcast(dhcp::SERVER_PORT, dhcp::CLIENT_PORT, &data, None) {
                    Ok(_) => {
                        let rc = this.clone();
                        host.register_udp4_bcast_callback(
                            dhcp::CLIENT_PORT,
                            Some(handler(move |host, view| {
                                Dhcp4Client::handle_packet(&rc, host, view);
                            })),
                        );
                        this.borrow_mut().state = Dhcp4State::AwaitOffer;
                    }
                    Err(err) => warn!("dhcp4: discover failed: {err}"),
                }
            }
            Dhcp4State::AwaitOffer => {
                if now - this.borrow().init_time > OFFER_TIMEOUT_S {
                    debug!("dhcp4: no offer, starting over");
                    this.borrow_mut().state = Dhcp4State::Init;
                }
            }
            Dhcp4State::Selecting => {
                if now - this.borrow().init_time > ACK_TIMEOUT_S {
                    debug!("dhcp4: no ack, starting over");
                    this.borrow_mut().state = Dhcp4State::Init;
                }
            }
            Dhcp4State::Bound => {
                let due = {
                    let c = this.borrow();
                    now - c.bound_time > u64::from(c.renewal_seconds)
                };
                if due {
                    let mut c = this.borrow_mut();
                    info!(
                        "dhcp4: renewal timer expired after {} s",
                        c.renewal_seconds
                    );
                    c.renew_attempt_cnt = 0;
                    c.state = Dhcp4State::RenewingInit;
                }
            }
            Dhcp4State::RenewingInit => {
                let (data, siaddr) = {
                    let mut c = this.borrow_mut();
                    c.init_time = now;
                    c.xid = c.rng.next_u32();
                    info!("dhcp4: renew request, xid 0x{:08x}", c.xid);
                    (c.make_request_renew(host.mac_addr()), c.siaddr)
                };
                match host.send_udp4(siaddr, dhcp::SERVER_PORT, &data, dhcp::CLIENT_PORT) {
                    Ok(_) => {
                        let rc = this.clone();
                        host.register_udp4_callback(
                            dhcp::CLIENT_PORT,
                            Some(handler(move |host, view| {
                                Dhcp4Client::handle_packet(&rc, host, view);
                            })),
                        );
                        let mut c = this.borrow_mut();
                        c.renew_attempt_cnt += 1;
                        c.state = Dhcp4State::Renewing;
                    }
                    Err(err) => {
                        warn!("dhcp4: renew request failed: {err}");
                        this.borrow_mut().state = Dhcp4State::Init;
                    }
                }
            }
            Dhcp4State::Renewing => {
                let mut c = this.borrow_mut();
                let since_bound = now - c.bound_time;
                if since_bound > u64::from(c.rebinding_seconds)
                    || since_bound > u64::from(c.lease_seconds)
                    || c.renew_attempt_cnt > MAX_RENEW_ATTEMPTS
                {
                    info!("dhcp4: renewal abandoned, reacquiring");
                    c.state = Dhcp4State::Init;
                } else if now - c.init_time > RENEW_REPLY_TIMEOUT_S {
                    c.state = Dhcp4State::RenewingInit;
                }
            }
        }
    }

    fn handle_packet<D: NetDevice>(
        this: &Rc<RefCell<Dhcp4Client>>,
        host: &mut Host<D>,
        view: &PacketView<'_>,
    ) {
        let Some(data) = view.udp_data() else {
            return;
        };
        let msg = match DhcpMessage::parse(data) {
            Ok(msg) => msg,
            Err(err) => {
                debug!("dhcp4: dropping malformed message: {err}");
                return;
            }
        };
        let now = host.now_ms() / 1000;

        let state = this.borrow().state;
        match state {
            Dhcp4State::AwaitOffer => {
                if !this.borrow().validate(host.mac_addr(), &msg) {
                    return;
                }
                if msg.message_type() != Some(msg_type::OFFER) {
                    debug!("dhcp4: unexpected message while awaiting offer");
                    this.borrow_mut().state = Dhcp4State::Init;
                    return;
                }
                let request = {
                    let mut c = this.borrow_mut();
                    c.yiaddr = msg.yiaddr;
                    c.siaddr = msg.siaddr;
                    info!("dhcp4: offer of {} from {}", c.yiaddr, c.siaddr);
                    c.make_request_offer(host.mac_addr())
                };
                match host.send_udp4_bcast(dhcp::SERVER_PORT, dhcp::CLIENT_PORT, &request, None) {
                    Ok(_) => this.borrow_mut().state = Dhcp4State::Selecting,
                    Err(err) => {
                        warn!("dhcp4: request failed: {err}");
                        this.borrow_mut().state = Dhcp4State::Init;
                    }
                }
            }
            Dhcp4State::Selecting => {
                if !this.borrow().validate(host.mac_addr(), &msg) {
                    return;
                }
                if msg.message_type() != Some(msg_type::ACK) {
                    debug!("dhcp4: unexpected message while selecting");
                    this.borrow_mut().state = Dhcp4State::Init;
                    return;
                }
                let applied = {
                    let mut c = this.borrow_mut();
                    c.yiaddr = msg.yiaddr;
                    c.siaddr = msg.siaddr;
                    c.apply_lease(host, &msg, view.eth_src, now)
                };
                if applied {
                    host.register_udp4_bcast_callback(dhcp::CLIENT_PORT, None);
                    this.borrow_mut().state = Dhcp4State::Bound;
                }
            }
            Dhcp4State::Renewing => {
                if !this.borrow().validate(host.mac_addr(), &msg) {
                    return;
                }
                if msg.message_type() != Some(msg_type::ACK) {
                    debug!("dhcp4: unexpected message while renewing");
                    this.borrow_mut().state = Dhcp4State::Init;
                    return;
                }
                let applied = {
                    let mut c = this.borrow_mut();
                    c.yiaddr = msg.yiaddr;
                    c.siaddr = msg.siaddr;
                    c.apply_lease(host, &msg, view.eth_src, now)
                };
                if applied {
                    host.register_udp4_callback(dhcp::CLIENT_PORT, None);
                    this.borrow_mut().state = Dhcp4State::Bound;
                }
            }
            Dhcp4State::Init | Dhcp4State::RenewingInit | Dhcp4State::Bound => {
                debug!("dhcp4: ignoring packet in {state:?} state");
            }
        }
    }

    fn validate(&self, our_mac: MacAddr, msg: &DhcpMessage) -> bool {
        if msg.op != dhcp::OP_REPLY {
            debug!("dhcp4: op mismatch");
            return false;
        }
        if msg.xid != self.xid {
            debug!(
                "dhcp4: xid mismatch (0x{:08x} vs 0x{:08x})",
                self.xid, msg.xid
            );
            return false;
        }
        if msg.htype != 1 || msg.hlen != 6 || msg.client_mac() != our_mac.0 {
            debug!("dhcp4: client hardware address mismatch");
            return false;
        }
        true
    }

    /// Installs the lease carried by an ACK: address configuration, DNS,
    /// the server's MAC, and the T1/T2 timers (halved and 7/8-scaled lease
    /// durations unless options 58/59 override them).
    fn apply_lease<D: NetDevice>(
        &mut self,
        host: &mut Host<D>,
        msg: &DhcpMessage,
        server_mac: MacAddr,
        now: u64,
    ) -> bool {
        let Some(mask) = msg.option_ip(opt::SUBNET_MASK) else {
            warn!("dhcp4: ack without subnet mask");
            return false;
        };
        let Some(router) = msg.option_ip(opt::ROUTER) else {
            warn!("dhcp4: ack without router");
            return false;
        };

        info!(
            "dhcp4: bound to {} (mask {mask}, router {router})",
            self.yiaddr
        );
        host.set_ipv4(self.yiaddr, mask, router);
        host.add_arp_entry(self.siaddr, server_mac);
        if let Some(dns) = msg.option_ip(opt::DNS_SERVERS) {
            host.set_dns_server(dns);
        }

        self.bound_time = now;
        self.lease_seconds = msg.option_u32(opt::LEASE_TIME).unwrap_or(DEFAULT_LEASE_S);
        self.renewal_seconds = msg
            .option_u32(opt::RENEWAL_TIME)
            .unwrap_or(self.lease_seconds / 2);
        self.rebinding_seconds = msg
            .option_u32(opt::REBINDING_TIME)
            .unwrap_or((u64::from(self.lease_seconds) * 7 / 8) as u32);
        true
    }

    fn base_message(&self, our_mac: MacAddr) -> DhcpMessage {
        let mut msg = DhcpMessage {
            op: dhcp::OP_REQUEST,
            xid: self.xid,
            ..DhcpMessage::default()
        };
        msg.chaddr[..6].copy_from_slice(&our_mac.0);
        msg
    }

    /// Hostname (when configured), maximum message size and the parameter
    /// request list, in that order.
    fn push_common_options(&self, msg: &mut DhcpMessage) {
        if let Some(name) = self.hostname.as_deref() {
            if !name.is_empty() {
                msg.set_option(opt::HOSTNAME, name.as_bytes());
            }
        }
        msg.set_option(opt::MAX_MSG_SIZE, &(ETH_MTU as u16).to_be_bytes());
        msg.set_option(opt::PARAM_REQUEST, &self.param_request);
    }

    fn make_discover(&self, our_mac: MacAddr) -> Vec<u8> {
        let mut msg = self.base_message(our_mac);
        msg.flags = dhcp::FLAG_BROADCAST;
        msg.set_option(opt::MESSAGE_TYPE, &[msg_type::DISCOVER]);
        self.push_common_options(&mut msg);
        msg.serialize()
    }

    fn make_request_offer(&self, our_mac: MacAddr) -> Vec<u8> {
        let mut msg = self.base_message(our_mac);
        msg.flags = dhcp::FLAG_BROADCAST;
        msg.set_option(opt::MESSAGE_TYPE, &[msg_type::REQUEST]);
        msg.set_option(opt::REQUESTED_IP, &self.yiaddr.octets());
        msg.set_option(opt::SERVER_ID, &self.siaddr.octets());
        self.push_common_options(&mut msg);
        msg.serialize()
    }

    /// The renewing REQUEST goes unicast to the leasing server, carries our
    /// current address in `ciaddr` and identifies us with option 61.
    fn make_request_renew(&self, our_mac: MacAddr) -> Vec<u8> {
        let mut msg = self.base_message(our_mac);
        msg.ciaddr = self.yiaddr;
        msg.set_option(opt::MESSAGE_TYPE, &[msg_type::REQUEST]);
        let mut client_id = [0u8; 7];
        client_id[0] = 0x01; // hardware type: Ethernet
        client_id[1..].copy_from_slice(&our_mac.0);
        msg.set_option(opt::CLIENT_ID, &client_id);
        self.push_common_options(&mut msg);
        msg.serialize()
    }
}
