//! TCPv4 dispatch hook and segment emission. Connection management lives
//! with whoever registers the hook; the stack only verifies and routes.

use crate::device::NetDevice;
use crate::host::Host;
use crate::view::{PacketView, TransportMeta};
use crate::SendError;
use core::net::Ipv4Addr;
use log::{debug, warn};
use picolink_packetlib::{ipv4, tcp, EtherType, EthernetFrame, Ipv4Packet, TcpFlags, TcpSegment};

pub(crate) fn process<D: NetDevice>(
    host: &mut Host<D>,
    frame: &[u8],
    eth: &EthernetFrame<'_>,
    ip: &Ipv4Packet<'_>,
    meta: crate::view::Ipv4Meta,
) {
    let segment = match TcpSegment::parse(ip.payload) {
        Ok(segment) => segment,
        Err(err) => {
            debug!("tcp4: dropping segment: {err}");
            return;
        }
    };

    let Some(handler) = host.tcp_unicast.get(&segment.dst_port).cloned() else {
        return;
    };

    if !TcpSegment::verify_checksum(ip.payload, ip.src, ip.dst) {
        warn!("tcp4: invalid checksum from {}", ip.src);
        return;
    }

    let options_offset = meta.payload_offset + tcp::HEADER_LEN;
    let data_offset = options_offset + segment.options.len();
    let view = PacketView {
        frame,
        eth_dst: eth.dst,
        eth_src: eth.src,
        eth_type: eth.ethertype,
        eth_payload_offset: eth.payload_offset,
        ipv4: Some(meta),
        transport: Some(TransportMeta::Tcp {
            src_port: segment.src_port,
            dst_port: segment.dst_port,
            seq: segment.seq,
            ack: segment.ack,
            flags: segment.flags,
            window: segment.window,
            urgent: segment.urgent,
            options_offset,
            data_offset,
            data_end: meta.payload_end,
        }),
    };
    host.dispatch(handler, &view);
}

impl<D: NetDevice> Host<D> {
    /// Emits one TCP segment towards `dst_ip:dst_port`. The caller owns
    /// sequence numbers, flags and options.
    #[allow(clippy::too_many_arguments)]
    pub fn send_tcp4(
        &mut self,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        src_port: u16,
        data: &[u8],
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        window: u16,
        options: &[u8],
    ) -> Result<usize, SendError> {
        let Some(dst_mac) = self.resolve_next_hop(dst_ip) else {
            warn!("tcp4: {dst_ip} has no resolved next hop");
            return Err(SendError::ArpUnresolved);
        };

        let ident = self.next_ident();
        let src_ip = self.ip_addr;
        let eth_hdr = EthernetFrame::header(dst_mac, self.mac_addr, EtherType::IPV4);
        let tcp_hdr = tcp::header(
            src_ip, src_port, dst_ip, dst_port, seq, ack, flags, window, options, data,
        );
        let ip_hdr = ipv4::header(
            src_ip,
            dst_ip,
            ident,
            ipv4::PROTO_TCP,
            tcp_hdr.len() + data.len(),
            false,
            0,
        );
        Ok(self.transmit(&[&eth_hdr, &ip_hdr, &tcp_hdr, data])?)
    }
}
