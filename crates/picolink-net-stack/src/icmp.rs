//! ICMPv4: the stack answers echo requests and logs the rest.

use crate::device::NetDevice;
use crate::host::Host;
use log::{debug, info};
use picolink_packetlib::{icmp, ipv4, EtherType, EthernetFrame, IcmpMessage, Ipv4Packet};

pub(crate) fn process<D: NetDevice>(
    host: &mut Host<D>,
    eth: &EthernetFrame<'_>,
    ip: &Ipv4Packet<'_>,
) {
    let message = match IcmpMessage::parse(ip.payload) {
        Ok(message) => message,
        Err(err) => {
            debug!("icmp4: dropping message: {err}");
            return;
        }
    };

    match message.icmp_type {
        icmp::ECHO_REQUEST => send_echo_reply(host, eth, ip),
        icmp::DEST_UNREACHABLE => {
            info!("icmp4: destination unreachable, code {}", message.code);
        }
        other => debug!("icmp4: ignoring type {other}"),
    }
}

/// Echo the received message back: same identifier, sequence and payload,
/// with the type rewritten and the checksum recomputed.
fn send_echo_reply<D: NetDevice>(host: &mut Host<D>, eth: &EthernetFrame<'_>, ip: &Ipv4Packet<'_>) {
    let reply = icmp::echo_reply(ip.payload);
    let ident = host.next_ident();
    let ip_hdr = ipv4::header(
        host.ip_addr,
        ip.src,
        ident,
        ipv4::PROTO_ICMP,
        reply.len(),
        false,
        0,
    );
    let eth_hdr = EthernetFrame::header(eth.src, host.mac_addr, EtherType::IPV4);
    if let Err(err) = host.transmit(&[&eth_hdr, &ip_hdr, &reply]) {
        debug!("icmp4: failed to send echo reply: {err}");
    }
}
