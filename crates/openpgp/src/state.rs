//! Card session states and the legal moves between them

use derive_more::Display;

use crate::{Error, Result};

/// Where a card session stands
///
/// States only move forward, one step at a time. [`SessionState::Failed`] is reachable
/// from every state and, like [`SessionState::Complete`], ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SessionState {
    /// No device handle yet
    #[display("disconnected")]
    Disconnected,
    /// Device handle opened
    #[display("opened")]
    Opened,
    /// USB configuration selected
    #[display("configuration selected")]
    ConfigurationSelected,
    /// Card reader interface claimed
    #[display("interface claimed")]
    InterfaceClaimed,
    /// Card powered on
    #[display("powered on")]
    PowerOn,
    /// T=1 parameters confirmed and set
    #[display("parameters negotiated")]
    ParametersNegotiated,
    /// OpenPGP application selected
    #[display("applet selected")]
    AppletSelected,
    /// Every PIN reference verified
    #[display("PIN verified")]
    PinVerified,
    /// Sending the decipher chunk at `chunk`
    #[display("deciphering chunk {chunk}")]
    Deciphering {
        /// Zero-based chunk index
        chunk: usize,
    },
    /// Waiting for the tap, `attempt` reads made so far
    #[display("awaiting result (attempt {attempt})")]
    AwaitingResult {
        /// Reads made so far
        attempt: u32,
    },
    /// Session finished successfully
    #[display("complete")]
    Complete,
    /// Session ended on an error
    #[display("failed: {_0}")]
    Failed(String),
}

impl SessionState {
    /// Whether the session has ended
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }

    /// Whether `next` is a legal successor of this state
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        use SessionState::*;

        match (self, next) {
            (Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Disconnected, Opened)
            | (Opened, ConfigurationSelected)
            | (ConfigurationSelected, InterfaceClaimed)
            | (InterfaceClaimed, PowerOn)
            | (PowerOn, ParametersNegotiated)
            | (ParametersNegotiated, AppletSelected)
            | (AppletSelected, PinVerified)
            | (AppletSelected, Complete)
            | (PinVerified, Deciphering { chunk: 0 })
            | (Deciphering { .. }, AwaitingResult { attempt: 0 })
            | (AwaitingResult { .. }, Complete) => true,
            (Deciphering { chunk: from }, Deciphering { chunk: to }) => *to == *from + 1,
            (AwaitingResult { attempt: from }, AwaitingResult { attempt: to }) => *to == *from + 1,
            _ => false,
        }
    }

    /// Move to `next`, rejecting anything but a legal successor
    pub fn transition(self, next: Self) -> Result<Self> {
        if self.can_transition_to(&next) {
            Ok(next)
        } else {
            Err(Error::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}
