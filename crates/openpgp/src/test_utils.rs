//! In-memory channel and sleeper for session tests

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use cardvault_ccid::{CardChannel, CcidFrame, ChannelError, message_type};

use crate::poller::Sleeper;

/// Everything a [`ScriptedChannel`] observed
#[derive(Debug, Default)]
pub(crate) struct ChannelLog {
    pub(crate) opened: bool,
    pub(crate) claimed: bool,
    pub(crate) written: Vec<Bytes>,
    pub(crate) reads: usize,
    pub(crate) aborts: Vec<(u8, u8)>,
    pub(crate) released: usize,
}

impl ChannelLog {
    /// APDU bytes of every XfrBlock written, in order
    pub(crate) fn apdus(&self) -> Vec<Bytes> {
        self.written
            .iter()
            .filter(|raw| raw[0] == message_type::PC_TO_RDR_XFR_BLOCK)
            .map(|raw| raw.slice(10..))
            .collect()
    }
}

/// Channel replaying canned reader frames and recording what is sent
#[derive(Debug, Default)]
pub(crate) struct ScriptedChannel {
    replies: VecDeque<Result<Bytes, ChannelError>>,
    claim_error: Option<ChannelError>,
    log: Arc<Mutex<ChannelLog>>,
}

impl ScriptedChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn log(&self) -> Arc<Mutex<ChannelLog>> {
        Arc::clone(&self.log)
    }

    pub(crate) fn reply(mut self, frame: Bytes) -> Self {
        self.replies.push_back(Ok(frame));
        self
    }

    pub(crate) fn reply_timeout(mut self) -> Self {
        self.replies.push_back(Err(ChannelError::Timeout));
        self
    }

    pub(crate) fn fail_claim(mut self, error: ChannelError) -> Self {
        self.claim_error = Some(error);
        self
    }

    /// Replies for power on, get/set parameters and SELECT
    /// Queue `frame` ahead of every reply already scripted
    pub(crate) fn reply_first(mut self, frame: Bytes) -> Self {
        self.replies.push_front(Ok(frame));
        self
    }

    /// Put a successful setup exchange ahead of the scripted replies
    pub(crate) fn with_setup(self) -> Self {
        self.reply_first(data_block(&[0x90, 0x00]))
            .reply_first(parameters_reply(0x01))
            .reply_first(parameters_reply(0x01))
            .reply_first(slot_status_reply(0x00))
    }
}

impl CardChannel for ScriptedChannel {
    fn open(&mut self) -> Result<(), ChannelError> {
        self.log.lock().unwrap().opened = true;
        Ok(())
    }

    fn select_configuration(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn claim_interface(&mut self) -> Result<(), ChannelError> {
        if let Some(error) = self.claim_error.take() {
            return Err(error);
        }
        self.log.lock().unwrap().claimed = true;
        Ok(())
    }

    fn do_send(&mut self, frame: &[u8]) -> Result<(), ChannelError> {
        self.log
            .lock()
            .unwrap()
            .written
            .push(Bytes::copy_from_slice(frame));
        Ok(())
    }

    fn do_receive(&mut self, _max_len: usize) -> Result<Bytes, ChannelError> {
        self.log.lock().unwrap().reads += 1;
        self.replies.pop_front().unwrap_or(Err(ChannelError::Timeout))
    }

    fn abort(&mut self, slot: u8, sequence: u8) -> Result<(), ChannelError> {
        self.log.lock().unwrap().aborts.push((slot, sequence));
        Err(ChannelError::Timeout)
    }

    fn release(&mut self) {
        self.log.lock().unwrap().released += 1;
    }
}

fn reader_frame(kind: u8, params: [u8; 3], payload: &[u8]) -> Bytes {
    CcidFrame::new(kind, 0, payload.to_vec())
        .with_params(params)
        .encode()
        .unwrap()
}

/// `RDR_to_PC_DataBlock` carrying `payload` on an active card
pub(crate) fn data_block(payload: &[u8]) -> Bytes {
    reader_frame(message_type::RDR_TO_PC_DATA_BLOCK, [0, 0, 0], payload)
}

/// `RDR_to_PC_DataBlock` with the time extension bit set
pub(crate) fn time_extension() -> Bytes {
    reader_frame(message_type::RDR_TO_PC_DATA_BLOCK, [0x80, 0x01, 0], &[])
}

/// `RDR_to_PC_DataBlock` for a transfer the reader failed, without card data
pub(crate) fn reader_failure(status: u8, error: u8) -> Bytes {
    reader_frame(message_type::RDR_TO_PC_DATA_BLOCK, [status, error, 0], &[])
}

/// Power on reply with the given `bStatus`
pub(crate) fn slot_status_reply(status: u8) -> Bytes {
    reader_frame(
        message_type::RDR_TO_PC_DATA_BLOCK,
        [status, 0, 0],
        &[0x3B, 0xF8, 0x13, 0x00],
    )
}

/// `RDR_to_PC_Parameters` announcing `protocol`
pub(crate) fn parameters_reply(protocol: u8) -> Bytes {
    reader_frame(
        message_type::RDR_TO_PC_PARAMETERS,
        [0, 0, protocol],
        &[0x11, 0x10, 0x00, 0x15, 0x00, 0xFE, 0x00],
    )
}

/// Sleeper that records instead of blocking
#[derive(Debug, Default)]
pub(crate) struct RecordingSleeper {
    pub(crate) sleeps: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}
