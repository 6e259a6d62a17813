//! Error type for APDU encoding and decoding

/// Result type for APDU operations
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors raised while building or parsing APDUs
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Response shorter than the two status word bytes
    #[error("Incomplete response: {0} bytes, status word needs 2")]
    Incomplete(usize),

    /// Command data does not fit a single short APDU
    #[error("Data too long: {len} bytes (max {max})")]
    DataTooLong {
        /// Data length that was supplied
        len: usize,
        /// Largest accepted data length
        max: usize,
    },

    /// Raw command bytes do not form a valid short APDU
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// Chunk size of zero or above the short APDU limit
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),
}
