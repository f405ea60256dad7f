//! Driver for the Microchip ENC28J60, a stand-alone 10 Mbit Ethernet
//! MAC+PHY with an SPI host interface and 8 KiB of on-chip SRAM split
//! between RX and TX FIFOs.
//!
//! The driver is written against three small collaborator traits — an SPI
//! bus, a chip-select line and a coarse clock — so it runs unchanged on a
//! real bus or against the [`sim`] behavioral model used by the tests.

#![cfg_attr(not(feature = "std"), no_std)]

mod driver;
pub mod regs;
#[cfg(feature = "sim")]
pub mod sim;

pub use driver::{derive_mac, Enc28j60, Enc28j60Config};

use thiserror::Error;

/// Size of the largest frame the chip is configured to pass (MAMXFL).
pub const MAX_FRAME_LEN: usize = 1518;

/// How long a PHY register access may keep MISTAT.BUSY asserted before the
/// driver gives up. The datasheet worst case is ~10.24 us; a stuck flag
/// means the MII interface is wedged.
pub const PHY_BUSY_TIMEOUT_MS: u64 = 10;

/// Full-duplex 8-bit SPI transfers; chip-select is managed separately so a
/// single assertion can span several writes (buffer streaming).
pub trait SpiBus {
    fn write(&mut self, data: &[u8]);

    /// Simultaneously shifts `tx` out and fills `rx`; both slices have the
    /// same length.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]);

    /// Clocks out zeros while filling `data`.
    fn read(&mut self, data: &mut [u8]);
}

/// Active-low chip-select line for the ENC28J60.
pub trait ChipSelect {
    fn select(&mut self);
    fn deselect(&mut self);
}

/// Millisecond sleep plus a coarse monotonic millisecond counter.
pub trait Clock {
    fn sleep_ms(&mut self, ms: u32);
    fn now_ms(&mut self) -> u64;
}

/// Driver-level failures. Transmit-path conditions are recoverable (the
/// caller retries on a later tick); a PHY timeout is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Enc28j60Error {
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN}-byte transmit limit")]
    FrameTooLong(usize),
    #[error("link is down")]
    LinkDown,
    #[error("NIC reported a receive error")]
    Receive,
    #[error("PHY busy flag did not clear within {PHY_BUSY_TIMEOUT_MS} ms")]
    PhyBusyTimeout,
}
