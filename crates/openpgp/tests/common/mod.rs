//! Common test utilities

#![allow(dead_code, unreachable_pub)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use cardvault_ccid::{CardChannel, CcidFrame, ChannelError, message_type};
use cardvault_openpgp::Sleeper;

/// Frames written by a [`FakeToken`]
pub type Written = Arc<Mutex<Vec<Bytes>>>;

/// Token simulator replaying reader frames in order
#[derive(Debug, Default)]
pub struct FakeToken {
    replies: VecDeque<Bytes>,
    written: Written,
}

impl FakeToken {
    /// Token that answers the setup exchange successfully
    pub fn ready() -> Self {
        Self::default()
            .then(reader(message_type::RDR_TO_PC_DATA_BLOCK, [0, 0, 0], &[0x3B, 0x8C]))
            .then(reader(message_type::RDR_TO_PC_PARAMETERS, [0, 0, 1], &[0x11; 7]))
            .then(reader(message_type::RDR_TO_PC_PARAMETERS, [0, 0, 1], &[0x11; 7]))
            .then(apdu_reply(&[], 0x90, 0x00))
    }

    /// Queue another reply
    pub fn then(mut self, frame: Bytes) -> Self {
        self.replies.push_back(frame);
        self
    }

    /// Shared record of written frames
    pub fn written(&self) -> Written {
        Arc::clone(&self.written)
    }
}

impl CardChannel for FakeToken {
    fn open(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn select_configuration(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn claim_interface(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn do_send(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        self.written.lock().unwrap().push(Bytes::copy_from_slice(frame));
        Ok(())
    }

    fn do_receive(&mut self, _max_len: usize) -> Result<Bytes, ChannelError> {
        self.replies.pop_front().ok_or(ChannelError::Timeout)
    }

    fn abort(&mut self, _slot: u8, _sequence: u8) -> Result<(), ChannelError> {
        Ok(())
    }

    fn release(&mut self) {}
}

/// Reader frame of `kind`
pub fn reader(kind: u8, params: [u8; 3], payload: &[u8]) -> Bytes {
    CcidFrame::new(kind, 0, payload.to_vec())
        .with_params(params)
        .encode()
        .unwrap()
}

/// Data block carrying `data` and a status word
pub fn apdu_reply(data: &[u8], sw1: u8, sw2: u8) -> Bytes {
    let mut payload = data.to_vec();
    payload.extend_from_slice(&[sw1, sw2]);
    reader(message_type::RDR_TO_PC_DATA_BLOCK, [0, 0, 0], &payload)
}

/// Sleeper that returns immediately
#[derive(Debug, Default)]
pub struct NoSleep {
    pub total: Duration,
}

impl Sleeper for NoSleep {
    fn sleep(&mut self, duration: Duration) {
        self.total += duration;
    }
}
