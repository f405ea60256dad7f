//! The boundary between the stack and a network interface driver.

use thiserror::Error;

/// NIC-level failures surfaced through [`NetDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("frame exceeds the device transmit limit")]
    FrameTooLong,
    #[error("link is down")]
    LinkDown,
    #[error("device receive error")]
    Receive,
    #[error("device failure")]
    Failed,
}

/// A network interface as the stack sees it: scatter-gather transmit,
/// non-blocking single-frame receive, and link state queries.
pub trait NetDevice {
    fn mac_addr(&self) -> [u8; 6];

    /// Transmits the concatenation of `chunks` as one frame, returning its
    /// length.
    fn send(&mut self, chunks: &[&[u8]]) -> Result<usize, DeviceError>;

    /// Dequeues one pending frame into `buf`; `Ok(0)` when none is
    /// waiting.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;

    fn is_link_up(&mut self) -> bool;

    /// Consumes a latched link-change event, if any.
    fn link_state_changed(&mut self) -> bool;
}

#[cfg(feature = "enc28j60")]
mod enc28j60_impl {
    use super::{DeviceError, NetDevice};
    use log::warn;
    use picolink_enc28j60::{ChipSelect, Clock, Enc28j60, Enc28j60Error, SpiBus};

    impl From<Enc28j60Error> for DeviceError {
        fn from(err: Enc28j60Error) -> DeviceError {
            match err {
                Enc28j60Error::FrameTooLong(_) => DeviceError::FrameTooLong,
                Enc28j60Error::LinkDown => DeviceError::LinkDown,
                Enc28j60Error::Receive => DeviceError::Receive,
                Enc28j60Error::PhyBusyTimeout => DeviceError::Failed,
            }
        }
    }

    impl<S: SpiBus, C: ChipSelect, K: Clock> NetDevice for Enc28j60<S, C, K> {
        fn mac_addr(&self) -> [u8; 6] {
            Enc28j60::mac_addr(self)
        }

        fn send(&mut self, chunks: &[&[u8]]) -> Result<usize, DeviceError> {
            Ok(self.send_packet(chunks)?)
        }

        fn receive(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
            Ok(self.receive_packet(buf)?)
        }

        fn is_link_up(&mut self) -> bool {
            Enc28j60::is_link_up(self).unwrap_or_else(|err| {
                warn!("enc28j60: link query failed: {err}");
                false
            })
        }

        fn link_state_changed(&mut self) -> bool {
            Enc28j60::link_state_changed(self).unwrap_or_else(|err| {
                warn!("enc28j60: link event query failed: {err}");
                false
            })
        }
    }
}
