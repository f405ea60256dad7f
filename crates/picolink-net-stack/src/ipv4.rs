//! Inbound IPv4: validate, then hand off by protocol. Only whole
//! option-less datagrams are accepted; reassembly is out of scope.

use crate::device::NetDevice;
use crate::host::Host;
use crate::view::Ipv4Meta;
use crate::{icmp, tcp, udp};
use core::net::Ipv4Addr;
use log::{debug, warn};
use picolink_packetlib::{ipv4, EthernetFrame, Ipv4Packet};

pub(crate) fn process<D: NetDevice>(host: &mut Host<D>, frame: &[u8], eth: &EthernetFrame<'_>) {
    let packet = match Ipv4Packet::parse(eth.payload) {
        Ok(packet) => packet,
        Err(err) => {
            debug!("ip4: dropping packet: {err}");
            return;
        }
    };
    host.ip4_rx_count = host.ip4_rx_count.wrapping_add(1);

    if packet.version != 4 {
        warn!("ip4: version {} not supported", packet.version);
        return;
    }
    if packet.header_len != ipv4::HEADER_LEN {
        warn!("ip4: options not supported (header {} bytes)", packet.header_len);
        return;
    }
    if packet.more_fragments || packet.fragment_offset != 0 {
        warn!(
            "ip4: fragmented packet not supported (offset={}, mf={})",
            packet.fragment_offset, packet.more_fragments
        );
        return;
    }

    let meta = Ipv4Meta {
        src: packet.src,
        dst: packet.dst,
        protocol: packet.protocol,
        header_len: packet.header_len,
        total_len: packet.total_len,
        payload_offset: eth.payload_offset + packet.header_len,
        payload_end: eth.payload_offset + packet.total_len,
    };

    if packet.dst == host.ip_addr {
        match packet.protocol {
            ipv4::PROTO_ICMP => icmp::process(host, eth, &packet),
            ipv4::PROTO_TCP => tcp::process(host, frame, eth, &packet, meta),
            ipv4::PROTO_UDP => udp::process(host, frame, eth, &packet, meta, false),
            other => debug!("ip4: no handler for protocol {other}"),
        }
    } else if packet.dst == Ipv4Addr::BROADCAST {
        if packet.protocol == ipv4::PROTO_UDP {
            udp::process(host, frame, eth, &packet, meta, true);
        }
    }
}
