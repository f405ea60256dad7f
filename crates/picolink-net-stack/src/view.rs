//! Non-owning views over a received frame.

use picolink_packetlib::{EtherType, MacAddr, TcpFlags};
use core::net::Ipv4Addr;

/// A parsed window into the RX buffer, valid only for the duration of one
/// synchronous dispatch. Handlers must copy out anything they keep.
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    pub frame: &'a [u8],
    pub eth_dst: MacAddr,
    pub eth_src: MacAddr,
    pub eth_type: EtherType,
    /// Offset of the layer-2 payload (14, or 18 after an 802.1Q tag).
    pub eth_payload_offset: usize,
    pub ipv4: Option<Ipv4Meta>,
    pub transport: Option<TransportMeta>,
}

#[derive(Debug, Clone, Copy)]
pub struct Ipv4Meta {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub header_len: usize,
    pub total_len: usize,
    /// Offset of the IPv4 payload within the frame.
    pub payload_offset: usize,
    /// One past the last IPv4 payload byte within the frame.
    pub payload_end: usize,
}

#[derive(Debug, Clone, Copy)]
pub enum TransportMeta {
    Udp {
        src_port: u16,
        dst_port: u16,
        data_offset: usize,
        data_end: usize,
    },
    Tcp {
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        window: u16,
        urgent: u16,
        /// TCP options, as frame offsets.
        options_offset: usize,
        data_offset: usize,
        data_end: usize,
    },
}

impl<'a> PacketView<'a> {
    pub fn udp_src_port(&self) -> Option<u16> {
        match self.transport {
            Some(TransportMeta::Udp { src_port, .. }) => Some(src_port),
            _ => None,
        }
    }

    pub fn udp_dst_port(&self) -> Option<u16> {
        match self.transport {
            Some(TransportMeta::Udp { dst_port, .. }) => Some(dst_port),
            _ => None,
        }
    }

    pub fn udp_data(&self) -> Option<&'a [u8]> {
        match self.transport {
            Some(TransportMeta::Udp {
                data_offset,
                data_end,
                ..
            }) => Some(&self.frame[data_offset..data_end]),
            _ => None,
        }
    }

    pub fn tcp_data(&self) -> Option<&'a [u8]> {
        match self.transport {
            Some(TransportMeta::Tcp {
                data_offset,
                data_end,
                ..
            }) => Some(&self.frame[data_offset..data_end]),
            _ => None,
        }
    }

    /// Source address of the IPv4 layer, when present.
    pub fn ip_src(&self) -> Option<Ipv4Addr> {
        self.ipv4.map(|ip| ip.src)
    }

    pub fn ip_dst(&self) -> Option<Ipv4Addr> {
        self.ipv4.map(|ip| ip.dst)
    }
}
