//! USB CCID framing and transport
//!
//! Smart card readers built into USB security tokens speak the CCID class protocol:
//! every command and reply travels as a frame with a 10-byte header over a pair of
//! bulk endpoints. This crate provides:
//!
//! - [`CcidFrame`], the frame codec, with constructors for the messages the card
//!   engine sends
//! - [`SequenceCounter`], the per-session `bSeq` numbering
//! - [`CardChannel`], the transport seam, and [`UsbTransport`], its libusb implementation
//! - [`ChannelProvider`] for handing out a fresh channel per session
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod channel;
pub mod config;
pub mod frame;
pub mod sequence;
pub mod usb;

mod error;

pub use channel::{CardChannel, ChannelProvider};
pub use config::UsbConfig;
pub use error::{ChannelError, FrameError};
pub use frame::{CcidFrame, CommandStatus, HEADER_SIZE, message_type};
pub use sequence::SequenceCounter;
pub use usb::{UsbProvider, UsbTransport};
