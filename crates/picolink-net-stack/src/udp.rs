//! UDPv4: demultiplexing into the callback registries and the transmit
//! path, including outbound IPv4 fragmentation of oversized datagrams.

use crate::device::NetDevice;
use crate::host::Host;
use crate::view::{PacketView, TransportMeta};
use crate::{SendError, ETH_MTU};
use core::net::Ipv4Addr;
use log::{debug, warn};
use picolink_packetlib::{ipv4, udp, EtherType, EthernetFrame, Ipv4Packet, MacAddr, UdpDatagram};

pub(crate) fn process<D: NetDevice>(
    host: &mut Host<D>,
    frame: &[u8],
    eth: &EthernetFrame<'_>,
    ip: &Ipv4Packet<'_>,
    meta: crate::view::Ipv4Meta,
    broadcast: bool,
) {
    let datagram = match UdpDatagram::parse(ip.payload) {
        Ok(datagram) => datagram,
        Err(err) => {
            debug!("udp4: dropping datagram: {err}");
            return;
        }
    };

    // Look the handler up before paying for checksum verification.
    let registry = if broadcast {
        &host.udp_broadcast
    } else {
        &host.udp_unicast
    };
    let Some(handler) = registry.get(&datagram.dst_port).cloned() else {
        return;
    };

    if !datagram.verify_checksum(ip.src, ip.dst) {
        warn!("udp4: invalid checksum from {}", ip.src);
        return;
    }

    let view = PacketView {
        frame,
        eth_dst: eth.dst,
        eth_src: eth.src,
        eth_type: eth.ethertype,
        eth_payload_offset: eth.payload_offset,
        ipv4: Some(meta),
        transport: Some(TransportMeta::Udp {
            src_port: datagram.src_port,
            dst_port: datagram.dst_port,
            data_offset: meta.payload_offset + udp::HEADER_LEN,
            data_end: meta.payload_offset + usize::from(datagram.length),
        }),
    };
    host.dispatch(handler, &view);
}

impl<D: NetDevice> Host<D> {
    /// Sends `data` to `dst_ip:dst_port`, fragmenting on 8-byte boundaries
    /// when the datagram exceeds the MTU. Fails fast with
    /// [`SendError::ArpUnresolved`] when the next hop has no cache entry.
    /// Returns the number of link-layer payload bytes emitted.
    pub fn send_udp4(
        &mut self,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        data: &[u8],
        src_port: u16,
    ) -> Result<usize, SendError> {
        let Some(dst_mac) = self.resolve_next_hop(dst_ip) else {
            warn!("udp4: {dst_ip} has no resolved next hop");
            return Err(SendError::ArpUnresolved);
        };

        let ident = self.next_ident();
        let src_ip = self.ip_addr;
        let eth_hdr = EthernetFrame::header(dst_mac, self.mac_addr, EtherType::IPV4);
        let udp_hdr = udp::header(src_ip, src_port, dst_ip, dst_port, data);

        if ipv4::HEADER_LEN + udp::HEADER_LEN + data.len() <= ETH_MTU {
            let ip_hdr = ipv4::header(
                src_ip,
                dst_ip,
                ident,
                ipv4::PROTO_UDP,
                udp::HEADER_LEN + data.len(),
                false,
                0,
            );
            return Ok(self.transmit(&[&eth_hdr, &ip_hdr, &udp_hdr, data])?);
        }

        // Fragmentation: each fragment carries a multiple of eight payload
        // bytes; the UDP header rides only in the first fragment and all
        // fragments share this datagram's identification value.
        let max_frag = ((ETH_MTU - ipv4::HEADER_LEN) >> 3) << 3;
        let mut sent = 0;
        let mut start = 0;
        let mut stop = max_frag - udp::HEADER_LEN;
        let mut frag_offset = 0u16;

        while start < data.len() {
            let last = stop >= data.len();
            let end = if last { data.len() } else { stop };
            let ip_payload_len = if start == 0 {
                udp::HEADER_LEN + end
            } else {
                end - start
            };
            let ip_hdr = ipv4::header(
                src_ip,
                dst_ip,
                ident,
                ipv4::PROTO_UDP,
                ip_payload_len,
                !last,
                frag_offset,
            );
            sent += if start == 0 {
                self.transmit(&[&eth_hdr, &ip_hdr, &udp_hdr, &data[..end]])?
            } else {
                self.transmit(&[&eth_hdr, &ip_hdr, &data[start..end]])?
            };

            frag_offset += (max_frag >> 3) as u16;
            start = stop;
            stop += max_frag;
        }
        Ok(sent)
    }

    /// Broadcasts `data` to 255.255.255.255, from `src_ip` or 0.0.0.0.
    /// Used by clients (DHCP) that have no address yet.
    pub fn send_udp4_bcast(
        &mut self,
        dst_port: u16,
        src_port: u16,
        data: &[u8],
        src_ip: Option<Ipv4Addr>,
    ) -> Result<usize, SendError> {
        let src_ip = src_ip.unwrap_or(Ipv4Addr::UNSPECIFIED);
        let ident = self.next_ident();
        let eth_hdr = EthernetFrame::header(MacAddr::BROADCAST, self.mac_addr, EtherType::IPV4);
        let ip_hdr = ipv4::header(
            src_ip,
            Ipv4Addr::BROADCAST,
            ident,
            ipv4::PROTO_UDP,
            udp::HEADER_LEN + data.len(),
            false,
            0,
        );
        let udp_hdr = udp::header(
            src_ip,
            src_port,
            Ipv4Addr::BROADCAST,
            dst_port,
            data,
        );
        Ok(self.transmit(&[&eth_hdr, &ip_hdr, &udp_hdr, data])?)
    }
}
