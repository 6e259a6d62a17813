//! ISO/IEC 7816-4 APDU codec for the OpenPGP card engine
//!
//! This crate provides the command and response units exchanged with a smart card
//! application, restricted to the short form used by the card engine:
//!
//! - Encoding short command APDUs (`CLA INS P1 P2 [Lc data] [Le]`), with at most
//!   254 data bytes per command
//! - Splitting larger logical payloads into a command chain, flagging every
//!   non-final command with the chaining class bit (`0x10`)
//! - Decoding responses into their data and trailing status word
//!
//! Transport framing is not handled here; see the CCID crate for that.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;

mod error;
pub use error::{Error, Result};

pub use command::{CLA_CHAINING, Command, MAX_SHORT_DATA, chain, encode_short};
pub use response::status::StatusWord;
pub use response::{Response, decode_response};

/// Prelude module containing commonly used types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, Command, Error, Response, Result,
        command::{CLA_CHAINING, MAX_SHORT_DATA},
        response::status::{StatusWord, common as status},
    };
}
