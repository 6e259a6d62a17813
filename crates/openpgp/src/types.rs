//! Secrets and payloads passed through the decryption flow

use std::fmt;

use bytes::Bytes;
use cardvault_apdu::MAX_SHORT_DATA;
use zeroize::Zeroizing;

use crate::{Error, Result};

/// User PIN, wiped from memory on drop
#[derive(Clone)]
pub struct Pin(Zeroizing<String>);

impl Pin {
    /// Wrap a PIN
    pub fn new(pin: impl Into<String>) -> Self {
        Self(Zeroizing::new(pin.into()))
    }

    /// Bytes sent in the VERIFY data field
    ///
    /// # Errors
    /// Returns [`Error::InvalidPin`] for an empty, non-ASCII or overlong PIN.
    pub fn apdu_data(&self) -> Result<&[u8]> {
        let bytes = self.0.as_bytes();
        if bytes.is_empty() {
            return Err(Error::InvalidPin("PIN is empty"));
        }
        if !bytes.is_ascii() {
            return Err(Error::InvalidPin("PIN must be ASCII"));
        }
        if bytes.len() > MAX_SHORT_DATA {
            return Err(Error::InvalidPin("PIN is too long"));
        }
        Ok(bytes)
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(..)")
    }
}

impl From<&str> for Pin {
    fn from(pin: &str) -> Self {
        Self::new(pin)
    }
}

impl From<String> for Pin {
    fn from(pin: String) -> Self {
        Self::new(pin)
    }
}

/// Encrypted session key as found in a public-key encrypted session key packet
///
/// The first byte is the length prefix of the encrypted value; the rest is the
/// cryptogram itself.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherPayload(Bytes);

impl CipherPayload {
    /// Wrap raw payload bytes
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }

    /// Raw payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Data field for PSO:DECIPHER
    ///
    /// The leading length byte is dropped and, when `padding_indicator` is set,
    /// replaced by that byte.
    pub fn decipher_data(&self, padding_indicator: Option<u8>) -> Result<Zeroizing<Vec<u8>>> {
        let [_, cryptogram @ ..] = &self.0[..] else {
            return Err(Error::InvalidPayload("payload is empty"));
        };

        let mut data = Zeroizing::new(Vec::with_capacity(self.0.len()));
        data.extend(padding_indicator);
        data.extend_from_slice(cryptogram);
        if data.is_empty() {
            return Err(Error::InvalidPayload("payload holds no cryptogram"));
        }
        Ok(data)
    }
}

impl fmt::Debug for CipherPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CipherPayload").field(&self.0.len()).finish()
    }
}

impl From<Vec<u8>> for CipherPayload {
    fn from(payload: Vec<u8>) -> Self {
        Self::new(payload)
    }
}

/// Symmetric session key recovered from the card
pub struct SessionKey {
    algorithm: u8,
    key: Zeroizing<Vec<u8>>,
}

impl SessionKey {
    /// Key for `algorithm`
    pub const fn new(algorithm: u8, key: Zeroizing<Vec<u8>>) -> Self {
        Self { algorithm, key }
    }

    /// Symmetric algorithm id
    pub const fn algorithm(&self) -> u8 {
        self.algorithm
    }

    /// Key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Key length in bytes
    pub fn len(&self) -> usize {
        self.key.len()
    }

    /// Whether the key is empty
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("algorithm", &self.algorithm)
            .field("len", &self.key.len())
            .finish_non_exhaustive()
    }
}

/// Two-octet checksum of a session key: the sum of its bytes modulo 65536
pub fn session_key_checksum(key: &[u8]) -> u16 {
    key.iter().fold(0u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
}
