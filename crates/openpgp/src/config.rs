//! Card-side configuration

use std::time::Duration;

use cardvault_apdu::MAX_SHORT_DATA;
use serde::{Deserialize, Serialize};

use crate::constants::{RSA_PADDING_INDICATOR, algorithm, pin_reference};

/// Tunables for the card session and the result poller
///
/// The defaults match a YubiKey's OpenPGP application holding an RSA decryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// Data bytes per PSO:DECIPHER command
    pub chunk_size: usize,

    /// Byte replacing the payload's leading length byte, `None` to drop it only
    pub padding_indicator: Option<u8>,

    /// Symmetric algorithm the session key must name, `None` to accept any
    pub expected_algorithm: Option<u8>,

    /// Check the session key against its trailing checksum
    pub verify_checksum: bool,

    /// VERIFY references, sent in order with the same PIN
    pub pin_references: Vec<u8>,

    /// Delay between result reads, in milliseconds
    pub poll_interval_ms: u64,

    /// Maximum number of result reads
    pub poll_attempts: u32,

    /// Sequence value carried by the ABORT control request
    pub abort_sequence: u8,

    /// Bytes requested per bulk read
    pub response_buffer: usize,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            chunk_size: MAX_SHORT_DATA,
            padding_indicator: Some(RSA_PADDING_INDICATOR),
            expected_algorithm: Some(algorithm::AES_256),
            verify_checksum: true,
            pin_references: vec![pin_reference::PW1_OTHER, pin_reference::PW1_SIGN],
            poll_interval_ms: 500,
            poll_attempts: 20,
            abort_sequence: 2,
            response_buffer: 65556,
        }
    }
}

impl CardConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay between result reads
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Set the decipher chunk size
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the padding indicator
    pub const fn with_padding_indicator(mut self, padding_indicator: Option<u8>) -> Self {
        self.padding_indicator = padding_indicator;
        self
    }

    /// Set the expected symmetric algorithm
    pub const fn with_expected_algorithm(mut self, expected_algorithm: Option<u8>) -> Self {
        self.expected_algorithm = expected_algorithm;
        self
    }

    /// Enable or disable session key checksum verification
    pub const fn with_verify_checksum(mut self, verify_checksum: bool) -> Self {
        self.verify_checksum = verify_checksum;
        self
    }

    /// Set the VERIFY references
    pub fn with_pin_references(mut self, pin_references: impl Into<Vec<u8>>) -> Self {
        self.pin_references = pin_references.into();
        self
    }

    /// Set the poll interval and attempt budget
    pub const fn with_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self.poll_attempts = attempts;
        self
    }

    /// Set the ABORT sequence value
    pub const fn with_abort_sequence(mut self, abort_sequence: u8) -> Self {
        self.abort_sequence = abort_sequence;
        self
    }

    /// Set the bulk read size
    pub const fn with_response_buffer(mut self, response_buffer: usize) -> Self {
        self.response_buffer = response_buffer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CardConfig::default();
        assert_eq!(config.chunk_size, 254);
        assert_eq!(config.pin_references, vec![0x82, 0x81]);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.poll_attempts, 20);
        assert_eq!(config.abort_sequence, 2);
    }

    #[test]
    fn test_builders() {
        let config = CardConfig::new()
            .with_chunk_size(128)
            .with_padding_indicator(None)
            .with_expected_algorithm(None)
            .with_pin_references([0x82])
            .with_polling(Duration::from_millis(10), 3);

        assert_eq!(config.chunk_size, 128);
        assert_eq!(config.padding_indicator, None);
        assert_eq!(config.pin_references, vec![0x82]);
        assert_eq!(config.poll_interval_ms, 10);
        assert_eq!(config.poll_attempts, 3);
    }
}
