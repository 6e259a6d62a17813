//! Error types for CCID framing and the USB channel

use std::fmt;

/// Malformed CCID frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than the fixed 10-byte header
    #[error("Frame too short: {0} bytes, header needs 10")]
    TooShort(usize),

    /// Declared payload length differs from the bytes that follow the header
    #[error("Frame length mismatch: header declares {declared} bytes, {available} available")]
    LengthMismatch {
        /// Length carried in the header
        declared: u32,
        /// Bytes actually present after the header
        available: usize,
    },

    /// Payload larger than a frame can carry
    #[error("Frame payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// USB channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// No device matched the vendor filter
    NotFound {
        /// Vendor id that was searched for
        vendor_id: u16,
    },

    /// The reader interface is held by another session
    Busy,

    /// Transfer timed out
    Timeout,

    /// Bulk write accepted fewer bytes than the frame holds
    ShortWrite {
        /// Bytes written
        written: usize,
        /// Frame length
        expected: usize,
    },

    /// Operation on a channel that is not open
    Closed,

    /// Underlying libusb error
    Usb(#[source] rusb::Error),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { vendor_id } => {
                write!(f, "No USB device found for vendor {vendor_id:#06x}")
            }
            Self::Busy => write!(f, "Card reader interface is busy"),
            Self::Timeout => write!(f, "USB transfer timed out"),
            Self::ShortWrite { written, expected } => {
                write!(f, "Incomplete USB write: {written}/{expected} bytes")
            }
            Self::Closed => write!(f, "USB channel is not open"),
            Self::Usb(e) => write!(f, "USB error: {e}"),
        }
    }
}

impl From<rusb::Error> for ChannelError {
    fn from(error: rusb::Error) -> Self {
        match error {
            rusb::Error::Timeout => Self::Timeout,
            rusb::Error::Busy => Self::Busy,
            other => Self::Usb(other),
        }
    }
}
