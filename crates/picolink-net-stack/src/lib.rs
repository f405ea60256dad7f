//! A minimal IPv4 host stack for small embedded systems: Ethernet frame
//! dispatch, ARP with a cache, IPv4 with outbound fragmentation, ICMPv4
//! echo, UDPv4 unicast/broadcast demultiplexing, a TCPv4 dispatch hook and
//! a DHCPv4 client.
//!
//! The stack is a pure state machine around a [`NetDevice`]: a single
//! cooperative task calls [`Host::poll`] to drain and dispatch received
//! frames, then ticks the stateful components (the DHCP client). Time is
//! injected into every entry point, so nothing here touches a clock.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod arp;
mod device;
pub mod dhcp;
mod host;
mod icmp;
mod ipv4;
mod tcp;
mod udp;
mod view;

pub use device::{DeviceError, NetDevice};
pub use dhcp::{Dhcp4Client, Dhcp4Config, Dhcp4State};
pub use host::{handler, Handler, Host, HostConfig, StaticIpv4};
pub use view::{Ipv4Meta, PacketView, TransportMeta};

use thiserror::Error;

/// Largest IPv4 datagram that fits one Ethernet frame.
pub const ETH_MTU: usize = 1500;

/// Why an outbound datagram could not be emitted. ARP misses are the
/// common case; callers issue [`Host::connect_ip4`] and retry on a later
/// tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("next hop is not in the ARP table")]
    ArpUnresolved,
    #[error(transparent)]
    Device(#[from] DeviceError),
}
