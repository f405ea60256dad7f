//! TCP segment framing. The stack only dispatches segments to a registered
//! hook and emits caller-built segments; it keeps no connection state.

use crate::checksum::{checksum, pseudo_header};
use crate::ipv4::PROTO_TCP;
use crate::ParseError;
use core::net::Ipv4Addr;
use core::ops::BitOr;

pub const HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFlags(pub u16);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0x001);
    pub const SYN: TcpFlags = TcpFlags(0x002);
    pub const RST: TcpFlags = TcpFlags(0x004);
    pub const PSH: TcpFlags = TcpFlags(0x008);
    pub const ACK: TcpFlags = TcpFlags(0x010);
    pub const URG: TcpFlags = TcpFlags(0x020);

    pub fn contains(self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TcpFlags {
    type Output = TcpFlags;

    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
    pub options: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    pub fn parse(data: &'a [u8]) -> Result<TcpSegment<'a>, ParseError> {
        if data.len() < HEADER_LEN {
            return Err(ParseError::Truncated);
        }
        let do_flags = u16::from_be_bytes([data[12], data[13]]);
        let data_offset = usize::from(do_flags >> 12) << 2;
        if data_offset < HEADER_LEN || data.len() < data_offset {
            return Err(ParseError::Malformed);
        }
        Ok(TcpSegment {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst_port: u16::from_be_bytes([data[2], data[3]]),
            seq: u32::from_be_bytes(data[4..8].try_into().unwrap()),
            ack: u32::from_be_bytes(data[8..12].try_into().unwrap()),
            flags: TcpFlags(do_flags & 0x1ff),
            window: u16::from_be_bytes([data[14], data[15]]),
            checksum: u16::from_be_bytes([data[16], data[17]]),
            urgent: u16::from_be_bytes([data[18], data[19]]),
            options: &data[HEADER_LEN..data_offset],
            payload: &data[data_offset..],
        })
    }

    /// Verifies the pseudo-header checksum over the whole segment; `seg` is
    /// the same byte range the segment was parsed from.
    pub fn verify_checksum(seg: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        let sum = pseudo_header(src, dst, PROTO_TCP, seg.len() as u16);
        checksum(seg, sum) == 0
    }
}

/// Header (plus raw options) for a segment carrying `payload`; the checksum
/// covers the payload, so the result is ready to send as-is before it.
#[cfg(feature = "alloc")]
#[allow(clippy::too_many_arguments)]
pub fn header(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: TcpFlags,
    window: u16,
    options: &[u8],
    payload: &[u8],
) -> alloc::vec::Vec<u8> {
    debug_assert_eq!(options.len() % 4, 0);
    let header_len = HEADER_LEN + options.len();
    let do_flags = (((header_len as u16) << 10) & 0xf000) | (flags.0 & 0x1ff);

    let mut hdr = alloc::vec::Vec::with_capacity(header_len);
    hdr.extend_from_slice(&src_port.to_be_bytes());
    hdr.extend_from_slice(&dst_port.to_be_bytes());
    hdr.extend_from_slice(&seq.to_be_bytes());
    hdr.extend_from_slice(&ack.to_be_bytes());
    hdr.extend_from_slice(&do_flags.to_be_bytes());
    hdr.extend_from_slice(&window.to_be_bytes());
    hdr.extend_from_slice(&[0, 0, 0, 0]); // checksum, urgent pointer
    hdr.extend_from_slice(options);

    let tcp_len = (header_len + payload.len()) as u16;
    let mut sum = pseudo_header(src, dst, PROTO_TCP, tcp_len);
    let mut words = hdr.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    let sum = checksum(payload, sum);
    hdr[16..18].copy_from_slice(&sum.to_be_bytes());
    hdr
}
