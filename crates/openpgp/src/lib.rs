//! OpenPGP card engine
//!
//! Drives the OpenPGP application of a USB security key through a complete session:
//!
//! 1. Open the device, select its configuration and claim the card reader interface
//! 2. Power on the card and confirm the T=1 protocol
//! 3. Select the OpenPGP application and read the public key URL
//! 4. Verify the PIN
//! 5. Send the encrypted session key to PSO:DECIPHER as a command chain
//! 6. Poll for the result while the user taps the key
//!
//! [`Decrypter`] is the entry point. It recovers [`SessionKey`]s from
//! [`CipherPayload`]s, opening a fresh [`CardSession`] for every call.
//!
//! # Example
//!
//! ```no_run
//! use cardvault_ccid::{UsbConfig, UsbProvider};
//! use cardvault_openpgp::{CardConfig, CipherPayload, Decrypter, Pin};
//!
//! let provider = UsbProvider::new(UsbConfig::default());
//! let mut decrypter = Decrypter::new(provider, CardConfig::default());
//!
//! let payload = CipherPayload::new(vec![0x00; 257]);
//! let key = decrypter.decrypt(&payload, &Pin::new("123456"))?;
//! println!("algorithm {}", key.algorithm());
//! # Ok::<(), cardvault_openpgp::Error>(())
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod commands;
pub mod config;
pub mod constants;
pub mod decrypt;
pub mod poller;
pub mod session;
pub mod state;
pub mod types;

mod error;
#[cfg(test)]
mod test_utils;

pub use config::CardConfig;
pub use decrypt::{Decrypter, TapRequestFn};
pub use error::{Error, Refusal, Result};
pub use poller::{ResultPoller, Sleeper, ThreadSleeper};
pub use session::CardSession;
pub use state::SessionState;
pub use types::{CipherPayload, Pin, SessionKey, session_key_checksum};
