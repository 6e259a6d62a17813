use cardvault_apdu::StatusWord;
use cardvault_ccid::{ChannelError, FrameError};

use crate::state::SessionState;

/// Result type for card operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a command sent to the card did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Refusal {
    /// The card answered with a status word other than `90 00`
    #[display("card status {_0}")]
    Card(StatusWord),
    /// The reader failed the transfer before the card answered
    #[display("reader status {status:#04x}, error {error:#04x}")]
    Reader {
        /// `bStatus` of the reply
        status: u8,
        /// `bError` of the reply
        error: u8,
    },
}

impl Refusal {
    /// Status word of a card refusal
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::Card(status) => Some(*status),
            Self::Reader { .. } => None,
        }
    }
}

/// Error type for card operations
///
/// Every variant is terminal for the operation that raised it. Callers can match on
/// the kind to tell a wrong PIN apart from a missing device or a missed tap.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No device matched the vendor filter
    #[error("No security key found (vendor {vendor_id:#06x})")]
    DeviceNotFound {
        /// Vendor id that was searched for
        vendor_id: u16,
    },

    /// The card reader interface is held by another session
    #[error("Security key is in use by another session")]
    DeviceBusy,

    /// The reader did not power on the card
    #[error("Card power on failed (status {status:#04x}, error {error:#04x})")]
    PowerOn {
        /// `bStatus` of the reply
        status: u8,
        /// `bError` of the reply
        error: u8,
    },

    /// The card negotiated a protocol other than T=1
    #[error("Unsupported card protocol T={0}")]
    UnsupportedProtocol(u8),

    /// Getting or setting the T=1 parameters failed
    #[error("Protocol parameter negotiation failed (status {status:#04x}, error {error:#04x})")]
    ParameterNegotiation {
        /// `bStatus` of the reply
        status: u8,
        /// `bError` of the reply
        error: u8,
    },

    /// SELECT of the OpenPGP application was refused
    #[error("Failed to select OpenPGP application: {0}")]
    SelectApplet(Refusal),

    /// GET DATA for the public key URL was refused
    #[error("Unable to get public key URL: {0}")]
    GetData(Refusal),

    /// A VERIFY command was refused
    #[error("PIN verification failed: {0}")]
    PinVerification(Refusal),

    /// A non-final decipher chunk was refused
    #[error("Unable to push cryptogram chunk {chunk}: {status}")]
    DecipherTransfer {
        /// Zero-based chunk index
        chunk: usize,
        /// Why the chunk was refused
        status: Refusal,
    },

    /// No decipher result arrived within the polling budget
    #[error("Security key tap not detected in time ({attempts} attempts)")]
    TapTimeout {
        /// Read attempts made
        attempts: u32,
    },

    /// A reader frame could not be decoded
    #[error("Malformed CCID frame: {0}")]
    MalformedFrame(#[from] FrameError),

    /// Any other USB failure
    #[error("Transport error: {0}")]
    Transport(#[source] ChannelError),

    /// APDU encoding or decoding failed
    #[error(transparent)]
    Apdu(#[from] cardvault_apdu::Error),

    /// The deciphered session key names an unexpected symmetric algorithm
    #[error("Unknown key algorithm detected: {0:#04x}")]
    UnknownKeyAlgorithm(u8),

    /// The deciphered session key does not match its checksum
    #[error("Session key checksum mismatch (expected {expected:#06x}, computed {computed:#06x})")]
    SessionKeyChecksum {
        /// Checksum carried with the key
        expected: u16,
        /// Checksum computed over the key bytes
        computed: u16,
    },

    /// The card's decipher result does not have the expected shape
    #[error("Malformed decipher result: {0}")]
    MalformedResult(&'static str),

    /// The encrypted session key payload cannot be sent
    #[error("Invalid cipher payload: {0}")]
    InvalidPayload(&'static str),

    /// The PIN cannot be sent to the card
    #[error("Invalid PIN: {0}")]
    InvalidPin(&'static str),

    /// A step was attempted out of order
    #[error("Illegal session transition from {from} to {to}")]
    IllegalTransition {
        /// State the session was in
        from: SessionState,
        /// State that was requested
        to: SessionState,
    },

    /// The session's channel has already been released
    #[error("Card session is closed")]
    SessionClosed,
}

impl From<ChannelError> for Error {
    fn from(error: ChannelError) -> Self {
        match error {
            ChannelError::NotFound { vendor_id } => Self::DeviceNotFound { vendor_id },
            ChannelError::Busy => Self::DeviceBusy,
            other => Self::Transport(other),
        }
    }
}
