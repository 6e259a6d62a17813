//! CCID message framing
//!
//! Every message on the bulk endpoints carries a 10-byte header followed by the payload:
//!
//! ```text
//! Offset  Size  Description
//! 0       1     Message type
//! 1       4     Payload length (little-endian)
//! 5       1     Slot number (always 0)
//! 6       1     Sequence number
//! 7       3     Message-specific parameters
//! 10      N     Payload (APDU, ATR, protocol data structure)
//! ```
//!
//! For reader-to-host messages the three parameter bytes are `bStatus`, `bError`
//! and a message-specific byte (the protocol number for `RDR_to_PC_Parameters`).

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Size of the fixed frame header
pub const HEADER_SIZE: usize = 10;

/// Largest payload a frame may carry
pub const MAX_PAYLOAD: usize = 0xFFFF;

/// Protocol number of T=1 in parameter messages
pub const PROTOCOL_T1: u8 = 0x01;

/// Protocol data structure for T=1 sent with `PC_to_RDR_SetParameters`
///
/// bmFindexDindex, bmTCCKST1, bGuardTimeT1, bmWaitingIntegersT1, bClockStop,
/// bIFSC, bNadValue
pub const T1_PARAMETERS: [u8; 7] = [0x11, 0x10, 0x00, 0x15, 0x00, 0xFE, 0x00];

/// CCID message types
pub mod message_type {
    /// PC to Reader: set protocol parameters
    pub const PC_TO_RDR_SET_PARAMETERS: u8 = 0x61;
    /// PC to Reader: ICC power on
    pub const PC_TO_RDR_ICC_POWER_ON: u8 = 0x62;
    /// PC to Reader: get protocol parameters
    pub const PC_TO_RDR_GET_PARAMETERS: u8 = 0x6C;
    /// PC to Reader: transfer block (send APDU)
    pub const PC_TO_RDR_XFR_BLOCK: u8 = 0x6F;
    /// Reader to PC: data block (ATR or APDU response)
    pub const RDR_TO_PC_DATA_BLOCK: u8 = 0x80;
    /// Reader to PC: slot status
    pub const RDR_TO_PC_SLOT_STATUS: u8 = 0x81;
    /// Reader to PC: protocol parameters
    pub const RDR_TO_PC_PARAMETERS: u8 = 0x82;
}

/// Command status reported in bits 7..6 of `bStatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Command processed without error
    Processed,
    /// Command failed, `bError` holds the reason
    Failed,
    /// Reader asks for more time, the real answer follows later
    TimeExtension,
    /// Reserved value
    Reserved,
}

impl CommandStatus {
    /// Decode from a `bStatus` byte
    pub const fn from_status(status: u8) -> Self {
        match status >> 6 {
            0 => Self::Processed,
            1 => Self::Failed,
            2 => Self::TimeExtension,
            _ => Self::Reserved,
        }
    }
}

/// One CCID message
#[derive(Clone, PartialEq, Eq)]
pub struct CcidFrame {
    /// Message type, see [`message_type`]
    pub kind: u8,
    /// Slot number
    pub slot: u8,
    /// Sequence number
    pub sequence: u8,
    /// Message-specific parameter bytes
    pub params: [u8; 3],
    /// Payload following the header
    pub payload: Bytes,
}

impl CcidFrame {
    /// Create a frame for slot 0 with zeroed parameters
    pub fn new(kind: u8, sequence: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            slot: 0,
            sequence,
            params: [0; 3],
            payload: payload.into(),
        }
    }

    /// Set the parameter bytes
    pub const fn with_params(mut self, params: [u8; 3]) -> Self {
        self.params = params;
        self
    }

    /// `PC_to_RDR_IccPowerOn` with automatic voltage selection
    pub fn power_on(sequence: u8) -> Self {
        Self::new(message_type::PC_TO_RDR_ICC_POWER_ON, sequence, Bytes::new())
    }

    /// `PC_to_RDR_GetParameters`
    pub fn get_parameters(sequence: u8) -> Self {
        Self::new(message_type::PC_TO_RDR_GET_PARAMETERS, sequence, Bytes::new())
    }

    /// `PC_to_RDR_SetParameters` selecting T=1 with [`T1_PARAMETERS`]
    pub fn set_t1_parameters(sequence: u8) -> Self {
        Self::new(
            message_type::PC_TO_RDR_SET_PARAMETERS,
            sequence,
            Bytes::from_static(&T1_PARAMETERS),
        )
        .with_params([PROTOCOL_T1, 0x00, 0x00])
    }

    /// `PC_to_RDR_XfrBlock` carrying an APDU, with the given block waiting time integer
    pub fn xfr_block(sequence: u8, apdu: impl Into<Bytes>, bwi: u8) -> Self {
        Self::new(message_type::PC_TO_RDR_XFR_BLOCK, sequence, apdu).with_params([bwi, 0, 0])
    }

    /// Encode header and payload
    ///
    /// # Errors
    /// Returns [`FrameError::PayloadTooLarge`] for payloads above [`MAX_PAYLOAD`].
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge(self.payload.len()));
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u8(self.kind);
        buf.put_u32_le(self.payload.len() as u32);
        buf.put_u8(self.slot);
        buf.put_u8(self.sequence);
        buf.put_slice(&self.params);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Decode a frame, requiring the declared length to match the bytes available
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() < HEADER_SIZE {
            return Err(FrameError::TooShort(raw.len()));
        }

        let declared = u32::from_le_bytes([raw[1], raw[2], raw[3], raw[4]]);
        let available = raw.len() - HEADER_SIZE;
        if declared as usize != available {
            return Err(FrameError::LengthMismatch {
                declared,
                available,
            });
        }

        Ok(Self {
            kind: raw[0],
            slot: raw[5],
            sequence: raw[6],
            params: [raw[7], raw[8], raw[9]],
            payload: Bytes::copy_from_slice(&raw[HEADER_SIZE..]),
        })
    }

    /// `bStatus` of a reader message
    pub const fn slot_status(&self) -> u8 {
        self.params[0]
    }

    /// `bError` of a reader message
    pub const fn slot_error(&self) -> u8 {
        self.params[1]
    }

    /// Command status from `bStatus`
    pub const fn command_status(&self) -> CommandStatus {
        CommandStatus::from_status(self.slot_status())
    }

    /// ICC status from `bStatus` (0 = present and active)
    pub const fn icc_status(&self) -> u8 {
        self.slot_status() & 0x03
    }

    /// Protocol number of a `RDR_to_PC_Parameters` message
    pub const fn protocol(&self) -> u8 {
        self.params[2]
    }

    /// Whether the reader reports a processed command on an active card
    pub const fn is_ok(&self) -> bool {
        matches!(self.command_status(), CommandStatus::Processed) && self.icc_status() == 0
    }
}

impl fmt::Debug for CcidFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CcidFrame")
            .field("kind", &format_args!("{:#04x}", self.kind))
            .field("slot", &self.slot)
            .field("sequence", &self.sequence)
            .field("params", &format_args!("{}", hex::encode(self.params)))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
