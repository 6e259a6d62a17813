//! Transport channel abstraction for CCID readers
//!
//! A channel owns one device handle and moves raw CCID frames over a single pair of
//! bulk endpoints. It has no knowledge of frame contents or APDUs. Operations are
//! strictly ordered: one write, then the matching read.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::ChannelError;

/// Bidirectional frame exchange with a card reader
pub trait CardChannel: fmt::Debug {
    /// Open a handle to the device
    fn open(&mut self) -> Result<(), ChannelError>;

    /// Select the reader's USB configuration
    fn select_configuration(&mut self) -> Result<(), ChannelError>;

    /// Claim the card reader interface, failing with [`ChannelError::Busy`] if
    /// another session holds it
    fn claim_interface(&mut self) -> Result<(), ChannelError>;

    /// Send one frame with a single bulk OUT transfer
    fn send(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        trace!(len = frame.len(), "Writing frame");
        let result = self.do_send(frame);
        if let Err(e) = &result {
            debug!(error = ?e, "Transport error during write");
        }
        result
    }

    /// Receive one frame of at most `max_len` bytes with a single bulk IN transfer
    fn receive(&mut self, max_len: usize) -> Result<Bytes, ChannelError> {
        let result = self.do_receive(max_len);
        match &result {
            Ok(frame) => trace!(len = frame.len(), "Read frame"),
            Err(ChannelError::Timeout) => trace!("Read timed out"),
            Err(e) => debug!(error = ?e, "Transport error during read"),
        }
        result
    }

    /// Internal implementation of [`send`](Self::send)
    fn do_send(&mut self, frame: &[u8]) -> Result<(), ChannelError>;

    /// Internal implementation of [`receive`](Self::receive)
    fn do_receive(&mut self, max_len: usize) -> Result<Bytes, ChannelError>;

    /// Issue the class-specific ABORT control request for `slot` and `sequence`
    fn abort(&mut self, slot: u8, sequence: u8) -> Result<(), ChannelError>;

    /// Release the interface and close the handle; safe to call more than once
    fn release(&mut self);
}

/// Source of fresh, unopened channels, one per session
pub trait ChannelProvider {
    /// Channel type handed out
    type Channel: CardChannel;

    /// Find a matching device and return a channel for it
    fn acquire(&mut self) -> Result<Self::Channel, ChannelError>;
}

impl<F, C> ChannelProvider for F
where
    F: FnMut() -> Result<C, ChannelError>,
    C: CardChannel,
{
    type Channel = C;

    fn acquire(&mut self) -> Result<C, ChannelError> {
        self()
    }
}

/// `wValue` of the CCID ABORT request: sequence in the high byte, slot in the low byte
pub const fn abort_value(slot: u8, sequence: u8) -> u16 {
    ((sequence as u16) << 8) | slot as u16
}
