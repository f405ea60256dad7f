//! ARP resolution: answer requests for our address, learn from replies.

use crate::device::NetDevice;
use crate::host::Host;
use crate::SendError;
use core::net::Ipv4Addr;
use log::{debug, info};
use picolink_packetlib::{arp, ArpPacket, EtherType, EthernetFrame, MacAddr};

pub(crate) fn process<D: NetDevice>(host: &mut Host<D>, eth: &EthernetFrame<'_>) {
    let packet = match ArpPacket::parse(eth.payload) {
        Ok(packet) => packet,
        Err(err) => {
            debug!("arp: dropping packet: {err}");
            return;
        }
    };

    match packet.op {
        arp::OP_REQUEST => {
            if packet.target_ip != host.ip_addr {
                return;
            }
            debug!("arp: request for our address from {}", packet.sender_ip);
            host.add_arp_entry(packet.sender_ip, packet.sender_mac);
            let reply = ArpPacket::reply(
                host.mac_addr,
                host.ip_addr,
                packet.sender_mac,
                packet.sender_ip,
            );
            let eth_hdr = EthernetFrame::header(eth.src, host.mac_addr, EtherType::ARP);
            if let Err(err) = host.transmit(&[&eth_hdr, &reply.serialize()]) {
                debug!("arp: failed to send reply: {err}");
            }
        }
        arp::OP_REPLY => {
            info!("arp: {} is at {}", packet.sender_ip, packet.sender_mac);
            host.add_arp_entry(packet.sender_ip, packet.sender_mac);
        }
        other => debug!("arp: ignoring operation {other}"),
    }
}

impl<D: NetDevice> Host<D> {
    /// Broadcasts a who-has request for `target`.
    pub fn send_arp_request(&mut self, target: Ipv4Addr) -> Result<usize, SendError> {
        let request = ArpPacket::request(self.mac_addr, self.ip_addr, target);
        let eth_hdr = EthernetFrame::header(MacAddr::BROADCAST, self.mac_addr, EtherType::ARP);
        Ok(self.transmit(&[&eth_hdr, &request.serialize()])?)
    }

    /// Starts next-hop resolution towards `ip`: requests the peer itself
    /// when it is on our subnet, otherwise makes sure the gateway is
    /// resolved.
    pub fn connect_ip4(&mut self, ip: Ipv4Addr) -> Result<(), SendError> {
        if self.is_local_ip4(ip) {
            self.send_arp_request(ip)?;
        } else if !self.is_connected_ip4(self.gateway) {
            let gateway = self.gateway;
            self.send_arp_request(gateway)?;
        }
        Ok(())
    }
}
