//! DHCPv4 message encoding (RFC 2131, options per RFC 2132).
//!
//! A message is the 236-byte fixed header, the magic cookie, then TLV
//! options terminated by 255. Options keep their insertion order on the
//! wire, which some servers are picky about.

use crate::ParseError;
use core::net::Ipv4Addr;

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

pub const OP_REQUEST: u8 = 1;
pub const OP_REPLY: u8 = 2;

pub const FLAG_BROADCAST: u16 = 0x8000;

pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

pub const HEADER_LEN: usize = 236;

/// Option codes the client emits or inspects.
pub mod opt {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const DNS_SERVERS: u8 = 6;
    pub const HOSTNAME: u8 = 12;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const PARAM_REQUEST: u8 = 55;
    pub const MAX_MSG_SIZE: u8 = 57;
    pub const RENEWAL_TIME: u8 = 58;
    pub const REBINDING_TIME: u8 = 59;
    pub const CLIENT_ID: u8 = 61;
    pub const END: u8 = 255;
}

/// Values of the message-type option (53).
pub mod msg_type {
    pub const DISCOVER: u8 = 1;
    pub const OFFER: u8 = 2;
    pub const REQUEST: u8 = 3;
    pub const DECLINE: u8 = 4;
    pub const ACK: u8 = 5;
    pub const NAK: u8 = 6;
    pub const RELEASE: u8 = 7;
    pub const INFORM: u8 = 8;
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    /// `(code, value)` in wire order.
    pub options: Vec<(u8, Vec<u8>)>,
}

#[cfg(feature = "alloc")]
impl Default for DhcpMessage {
    fn default() -> DhcpMessage {
        DhcpMessage {
            op: OP_REQUEST,
            htype: 1, // Ethernet
            hlen: 6,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0; 16],
            sname: [0; 64],
            file: [0; 128],
            options: Vec::new(),
        }
    }
}

#[cfg(feature = "alloc")]
impl DhcpMessage {
    pub fn parse(data: &[u8]) -> Result<DhcpMessage, ParseError> {
        if data.len() < HEADER_LEN + MAGIC_COOKIE.len() {
            return Err(ParseError::Truncated);
        }
        let mut msg = DhcpMessage {
            op: data[0],
            htype: data[1],
            hlen: data[2],
            hops: data[3],
            xid: u32::from_be_bytes(data[4..8].try_into().unwrap()),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: ip_at(data, 12),
            yiaddr: ip_at(data, 16),
            siaddr: ip_at(data, 20),
            giaddr: ip_at(data, 24),
            chaddr: data[28..44].try_into().unwrap(),
            sname: data[44..108].try_into().unwrap(),
            file: data[108..236].try_into().unwrap(),
            options: Vec::new(),
        };
        if data[HEADER_LEN..HEADER_LEN + 4] != MAGIC_COOKIE {
            return Err(ParseError::Malformed);
        }

        let mut idx = HEADER_LEN + MAGIC_COOKIE.len();
        while idx < data.len() {
            let code = data[idx];
            idx += 1;
            match code {
                opt::END => break,
                opt::PAD => continue,
                _ => {}
            }
            if idx >= data.len() {
                return Err(ParseError::Truncated);
            }
            let len = usize::from(data[idx]);
            idx += 1;
            if idx + len > data.len() {
                return Err(ParseError::Truncated);
            }
            msg.options.push((code, data[idx..idx + len].to_vec()));
            idx += len;
        }
        Ok(msg)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.op);
        out.push(self.htype);
        out.push(self.hlen);
        out.push(self.hops);
        out.extend_from_slice(&self.xid.to_be_bytes());
        out.extend_from_slice(&self.secs.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.ciaddr.octets());
        out.extend_from_slice(&self.yiaddr.octets());
        out.extend_from_slice(&self.siaddr.octets());
        out.extend_from_slice(&self.giaddr.octets());
        out.extend_from_slice(&self.chaddr);
        out.extend_from_slice(&self.sname);
        out.extend_from_slice(&self.file);
        out.extend_from_slice(&MAGIC_COOKIE);
        for (code, value) in &self.options {
            out.push(*code);
            out.push(value.len() as u8);
            out.extend_from_slice(value);
        }
        out.push(opt::END);
        out
    }

    pub fn encoded_len(&self) -> usize {
        let opts: usize = self.options.iter().map(|(_, v)| 2 + v.len()).sum();
        HEADER_LEN + MAGIC_COOKIE.len() + opts + 1
    }

    /// Sets `code`, replacing an existing value without disturbing the
    /// option order.
    pub fn set_option(&mut self, code: u8, value: &[u8]) {
        match self.options.iter_mut().find(|(c, _)| *c == code) {
            Some((_, v)) => {
                v.clear();
                v.extend_from_slice(value);
            }
            None => self.options.push((code, value.to_vec())),
        }
    }

    pub fn option(&self, code: u8) -> Option<&[u8]> {
        self.options
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_slice())
    }

    pub fn message_type(&self) -> Option<u8> {
        self.option(opt::MESSAGE_TYPE)?.first().copied()
    }

    /// Reads a 4-byte option as an address.
    pub fn option_ip(&self, code: u8) -> Option<Ipv4Addr> {
        let v = self.option(code)?;
        let octets: [u8; 4] = v.get(..4)?.try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }

    /// Reads a 4-byte big-endian option as a number of seconds.
    pub fn option_u32(&self, code: u8) -> Option<u32> {
        let v = self.option(code)?;
        Some(u32::from_be_bytes(v.get(..4)?.try_into().ok()?))
    }

    pub fn client_mac(&self) -> [u8; 6] {
        self.chaddr[..6].try_into().unwrap()
    }
}

fn ip_at(data: &[u8], idx: usize) -> Ipv4Addr {
    Ipv4Addr::new(data[idx], data[idx + 1], data[idx + 2], data[idx + 3])
}
