//! Card session state machine
//!
//! A [`CardSession`] owns one channel and its sequence counter for the lifetime of one
//! operation. Each step writes a frame, reads the matching reply, checks it, and only
//! then moves the session forward. Any error moves the session to
//! [`SessionState::Failed`] and releases the channel; no further frames go out.

use bytes::Bytes;
use cardvault_apdu::{
    Command, Response, StatusWord, decode_response, response::utils::latin1_to_string,
};
use cardvault_ccid::{
    CardChannel, CcidFrame, ChannelError, CommandStatus, HEADER_SIZE, SequenceCounter,
    frame::PROTOCOL_T1,
};
use tracing::{Level, debug, info, instrument, trace, warn};

use crate::{
    CardConfig, Error, Pin, Refusal, Result, commands,
    constants::EXTENDED_BWI,
    poller::{Poll, RecoveredKey, ResultPoller, ResultSource, Sleeper},
    state::SessionState,
};

/// Slot of the only card in the reader
const SLOT: u8 = 0;

/// Whether a frame's payload may be written to the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    Loggable,
    Redacted,
}

/// One device session with the OpenPGP card application
#[derive(Debug)]
pub struct CardSession<C: CardChannel> {
    channel: Option<C>,
    sequence: SequenceCounter,
    state: SessionState,
    config: CardConfig,
}

impl<C: CardChannel> CardSession<C> {
    /// Session over an unopened `channel`
    pub const fn new(channel: C, config: CardConfig) -> Self {
        Self {
            channel: Some(channel),
            sequence: SequenceCounter::new(),
            state: SessionState::Disconnected,
            config,
        }
    }

    /// Current state
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Configuration in use
    pub const fn config(&self) -> &CardConfig {
        &self.config
    }

    /// Sequence number the next frame will carry
    pub const fn next_sequence(&self) -> u8 {
        self.sequence.peek()
    }

    /// Open the device, select its configuration and claim the reader interface
    #[instrument(level = "debug", skip_all)]
    pub fn connect(&mut self) -> Result<()> {
        self.run(|session| {
            session.ensure_can_advance(&SessionState::Opened)?;
            session.channel()?.open()?;
            session.advance(SessionState::Opened)?;

            session.channel()?.select_configuration()?;
            session.advance(SessionState::ConfigurationSelected)?;

            session.channel()?.claim_interface()?;
            session.advance(SessionState::InterfaceClaimed)
        })
    }

    /// Power on the card, returning its ATR
    #[instrument(level = "debug", skip_all)]
    pub fn power_on(&mut self) -> Result<Bytes> {
        self.run(|session| {
            session.ensure_can_advance(&SessionState::PowerOn)?;
            let sequence = session.sequence.next_sequence();
            let reply = session.exchange(&CcidFrame::power_on(sequence), Payload::Loggable)?;
            check_power_on(&reply)?;

            debug!(atr_len = reply.payload.len(), "Card powered on");
            session.advance(SessionState::PowerOn)?;
            Ok(reply.payload)
        })
    }

    /// Confirm the card runs T=1, then set the T=1 parameter block
    #[instrument(level = "debug", skip_all)]
    pub fn negotiate_parameters(&mut self) -> Result<()> {
        self.run(|session| {
            session.ensure_can_advance(&SessionState::ParametersNegotiated)?;

            let sequence = session.sequence.next_sequence();
            let reply = session.exchange(&CcidFrame::get_parameters(sequence), Payload::Loggable)?;
            check_protocol(&reply)?;

            let sequence = session.sequence.next_sequence();
            let reply =
                session.exchange(&CcidFrame::set_t1_parameters(sequence), Payload::Loggable)?;
            check_reader_ok(&reply)?;

            session.advance(SessionState::ParametersNegotiated)
        })
    }

    /// Cancel whatever a previous session may have left running on the card
    ///
    /// The request's outcome is ignored.
    pub fn abort(&mut self) -> Result<()> {
        self.run(|session| {
            let sequence = session.config.abort_sequence;
            if let Err(e) = session.channel()?.abort(SLOT, sequence) {
                debug!(error = %e, "Ignoring abort failure");
            }
            Ok(())
        })
    }

    /// SELECT the OpenPGP application
    #[instrument(level = "debug", skip_all)]
    pub fn select_applet(&mut self) -> Result<()> {
        self.run(|session| {
            session.ensure_can_advance(&SessionState::AppletSelected)?;
            session.transmit(
                &commands::select_openpgp(),
                EXTENDED_BWI,
                Payload::Loggable,
                Error::SelectApplet,
            )?;
            session.advance(SessionState::AppletSelected)
        })
    }

    /// Run every setup step up to and including applet selection
    pub fn open_applet(&mut self) -> Result<()> {
        self.connect()?;
        self.power_on()?;
        self.negotiate_parameters()?;
        self.abort()?;
        self.select_applet()
    }

    /// Read the public key URL stored on the card
    ///
    /// This is a query: the session stays in [`SessionState::AppletSelected`].
    #[instrument(level = "debug", skip_all)]
    pub fn get_key_reference(&mut self) -> Result<String> {
        self.run(|session| {
            session.require(SessionState::AppletSelected)?;
            let response = session.transmit(
                &commands::get_public_key_url(),
                EXTENDED_BWI,
                Payload::Loggable,
                Error::GetData,
            )?;
            Ok(latin1_to_string(response.data()))
        })
    }

    /// VERIFY `pin` against every configured reference, stopping at the first refusal
    #[instrument(level = "debug", skip_all)]
    pub fn verify_pin(&mut self, pin: &Pin) -> Result<()> {
        self.run(|session| {
            session.ensure_can_advance(&SessionState::PinVerified)?;
            let references = session.config.pin_references.clone();
            if references.is_empty() {
                return Err(Error::InvalidPin("no PIN references configured"));
            }
            let secret = pin.apdu_data()?;

            for reference in references {
                session.transmit(
                    &commands::verify(reference, secret),
                    0,
                    Payload::Redacted,
                    |refusal| {
                        let retries = refusal.status_word().and_then(|sw| sw.retries_left());
                        if let Some(retries) = retries {
                            debug!(reference, retries, "PIN refused");
                        }
                        Error::PinVerification(refusal)
                    },
                )?;
            }

            session.advance(SessionState::PinVerified)
        })
    }

    /// Send `data` to PSO:DECIPHER as a command chain
    ///
    /// Every non-final chunk must be acknowledged with `90 00`. The final chunk is only
    /// written: its reply arrives after the tap and is collected by
    /// [`await_result`](Self::await_result).
    #[instrument(level = "debug", skip_all, fields(len = data.len()))]
    pub fn decipher(&mut self, data: &[u8]) -> Result<()> {
        self.run(|session| {
            session.ensure_can_advance(&SessionState::Deciphering { chunk: 0 })?;
            let chain = commands::decipher_chain(data, session.config.chunk_size)?;
            let Some(last) = chain.len().checked_sub(1) else {
                return Err(Error::InvalidPayload("nothing to decipher"));
            };

            for (chunk, command) in chain.iter().enumerate() {
                session.advance(SessionState::Deciphering { chunk })?;
                if chunk == last {
                    session.write_apdu(command, 0, Payload::Redacted)?;
                    break;
                }

                session.transmit(command, 0, Payload::Redacted, |status| {
                    Error::DecipherTransfer { chunk, status }
                })?;
            }

            session.advance(SessionState::AwaitingResult { attempt: 0 })
        })
    }

    /// Poll for the decipher result, then complete the session
    #[instrument(level = "debug", skip_all)]
    pub fn await_result<S: Sleeper + ?Sized>(&mut self, sleeper: &mut S) -> Result<RecoveredKey> {
        self.run(|session| {
            let poller = ResultPoller::new(session.config.poll_interval(), session.config.poll_attempts)
                .with_expected_algorithm(session.config.expected_algorithm);
            let key = poller.poll(session, sleeper)?;

            session.advance(SessionState::Complete)?;
            session.release();
            Ok(key)
        })
    }

    /// Complete a query-only session and release the device
    pub fn finish(&mut self) -> Result<()> {
        self.run(|session| {
            session.advance(SessionState::Complete)?;
            session.release();
            Ok(())
        })
    }

    /// Run `step`, failing the session if it errors
    fn run<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.state.is_terminal() {
            return Err(Error::SessionClosed);
        }
        step(self).map_err(|error| self.fail(error))
    }

    fn fail(&mut self, error: Error) -> Error {
        if !matches!(self.state, SessionState::Failed(_)) {
            warn!(state = %self.state, %error, "Card session failed");
            self.state = SessionState::Failed(error.to_string());
        }
        self.release();
        error
    }

    fn release(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.release();
            debug!("Released card channel");
        }
    }

    fn ensure_can_advance(&self, next: &SessionState) -> Result<()> {
        if self.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::IllegalTransition {
                from: self.state.clone(),
                to: next.clone(),
            })
        }
    }

    fn require(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::IllegalTransition {
                from: self.state.clone(),
                to: expected,
            })
        }
    }

    fn advance(&mut self, next: SessionState) -> Result<()> {
        let next = self.state.clone().transition(next)?;
        debug!(from = %self.state, to = %next, "Session state");
        self.state = next;
        Ok(())
    }

    fn channel(&mut self) -> Result<&mut C> {
        self.channel.as_mut().ok_or(Error::SessionClosed)
    }

    fn write_frame(&mut self, frame: &CcidFrame, payload: Payload) -> Result<()> {
        let raw = frame.encode()?;
        log_frame(">>", &raw, payload);
        self.channel()?.send(&raw)?;
        Ok(())
    }

    fn read_frame(&mut self, payload: Payload) -> Result<CcidFrame> {
        let max_len = self.config.response_buffer;
        let raw = self.channel()?.receive(max_len)?;
        log_frame("<<", &raw, payload);
        Ok(CcidFrame::decode(&raw)?)
    }

    fn exchange(&mut self, frame: &CcidFrame, payload: Payload) -> Result<CcidFrame> {
        self.write_frame(frame, payload)?;
        self.read_frame(payload)
    }

    fn write_apdu(&mut self, command: &Command, bwi: u8, payload: Payload) -> Result<()> {
        let apdu = command.to_bytes()?;
        let sequence = self.sequence.next_sequence();
        self.write_frame(&CcidFrame::xfr_block(sequence, apdu, bwi), payload)
    }

    /// Exchange `command` and return the card's `90 00` response
    ///
    /// A failed reader reply or any other status word goes through `refused` to become
    /// the calling step's error.
    fn transmit(
        &mut self,
        command: &Command,
        bwi: u8,
        payload: Payload,
        refused: impl FnOnce(Refusal) -> Error,
    ) -> Result<Response> {
        self.write_apdu(command, bwi, payload)?;
        let reply = loop {
            let frame = self.read_frame(payload)?;
            if frame.command_status() != CommandStatus::TimeExtension {
                break frame;
            }
            trace!("Reader requested time extension");
        };

        if !reply.is_ok() {
            return Err(refused(Refusal::Reader {
                status: reply.slot_status(),
                error: reply.slot_error(),
            }));
        }

        let response = decode_response(&reply.payload)?;
        log_status(command.ins, response.status());
        if !response.is_success() {
            return Err(refused(Refusal::Card(response.status())));
        }
        Ok(response)
    }
}

impl<C: CardChannel> ResultSource for CardSession<C> {
    fn read_result(&mut self, attempt: u32) -> Result<Poll> {
        self.advance(SessionState::AwaitingResult { attempt })?;

        let max_len = self.config.response_buffer;
        let raw = match self.channel()?.receive(max_len) {
            Ok(raw) => raw,
            Err(ChannelError::Timeout) => return Ok(Poll::NotReady),
            Err(e) => return Err(e.into()),
        };
        log_frame("<<", &raw, Payload::Redacted);

        let frame = CcidFrame::decode(&raw)?;
        if frame.command_status() == CommandStatus::TimeExtension {
            trace!("Reader requested time extension");
            return Ok(Poll::NotReady);
        }

        Ok(decode_response(&frame.payload).map_or(Poll::NotReady, Poll::Response))
    }

    fn request_more(&mut self, remaining: u8) -> Result<()> {
        self.write_apdu(&Command::get_response(remaining), 0, Payload::Loggable)
    }
}

impl<C: CardChannel> Drop for CardSession<C> {
    fn drop(&mut self) {
        self.release();
    }
}

fn check_power_on(reply: &CcidFrame) -> Result<()> {
    if reply.is_ok() {
        Ok(())
    } else {
        Err(Error::PowerOn {
            status: reply.slot_status(),
            error: reply.slot_error(),
        })
    }
}

fn check_reader_ok(reply: &CcidFrame) -> Result<()> {
    if reply.is_ok() {
        Ok(())
    } else {
        Err(Error::ParameterNegotiation {
            status: reply.slot_status(),
            error: reply.slot_error(),
        })
    }
}

fn check_protocol(reply: &CcidFrame) -> Result<()> {
    check_reader_ok(reply)?;
    match reply.protocol() {
        PROTOCOL_T1 => Ok(()),
        other => Err(Error::UnsupportedProtocol(other)),
    }
}

fn log_status(ins: u8, status: StatusWord) {
    let level = status.tracing_level();
    if level == Level::DEBUG {
        debug!(ins = format_args!("{ins:#04x}"), %status, "{}", status.description());
    } else if level == Level::INFO {
        info!(ins = format_args!("{ins:#04x}"), %status, "{}", status.description());
    } else {
        warn!(ins = format_args!("{ins:#04x}"), %status, "{}", status.description());
    }
}

fn log_frame(direction: &'static str, raw: &[u8], payload: Payload) {
    match payload {
        Payload::Loggable => trace!(direction, frame = %hex::encode(raw), "CCID frame"),
        Payload::Redacted => {
            let header = &raw[..raw.len().min(HEADER_SIZE)];
            trace!(
                direction,
                header = %hex::encode(header),
                payload_len = raw.len().saturating_sub(HEADER_SIZE),
                "CCID frame (payload redacted)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use cardvault_apdu::StatusWord;

    use super::*;
    use crate::test_utils::{
        ChannelLog, RecordingSleeper, ScriptedChannel, data_block, parameters_reply,
        reader_failure, slot_status_reply, time_extension,
    };

    fn session(channel: ScriptedChannel) -> (CardSession<ScriptedChannel>, Arc<Mutex<ChannelLog>>) {
        let log = channel.log();
        (CardSession::new(channel, CardConfig::default()), log)
    }

    fn ready_session(channel: ScriptedChannel) -> (CardSession<ScriptedChannel>, Arc<Mutex<ChannelLog>>) {
        let (mut session, log) = session(channel.with_setup());
        session.open_applet().unwrap();
        (session, log)
    }

    #[test]
    fn test_setup_frames() {
        let (session, log) = ready_session(ScriptedChannel::new());
        let log = log.lock().unwrap();

        assert_eq!(session.state(), &SessionState::AppletSelected);
        assert!(log.opened && log.claimed);
        assert_eq!(log.written.len(), 4);
        assert_eq!(log.written[0].as_ref(), hex::decode("62000000000000000000").unwrap());
        assert_eq!(log.written[1].as_ref(), hex::decode("6c000000000001000000").unwrap());
        assert_eq!(
            log.written[2].as_ref(),
            hex::decode("610700000000020100001110001500fe00").unwrap()
        );
        assert_eq!(
            log.written[3].as_ref(),
            hex::decode("6f0b000000000304000000a4040006d27600012401").unwrap()
        );
        assert_eq!(log.aborts, vec![(0, 2)]);
        assert_eq!(session.next_sequence(), 4);
    }

    #[test]
    fn test_power_on_failure() {
        let channel = ScriptedChannel::new().reply(slot_status_reply(0x42));
        let (mut session, log) = session(channel);
        session.connect().unwrap();

        let err = session.power_on().unwrap_err();

        assert!(matches!(err, Error::PowerOn { status: 0x42, .. }));
        assert!(matches!(session.state(), SessionState::Failed(_)));
        assert_eq!(log.lock().unwrap().released, 1);
    }

    #[test]
    fn test_unsupported_protocol_halts() {
        let channel = ScriptedChannel::new()
            .reply(slot_status_reply(0x00))
            .reply(parameters_reply(0x02));
        let (mut session, log) = session(channel);

        let err = session.open_applet().unwrap_err();

        assert!(matches!(err, Error::UnsupportedProtocol(2)));
        let log = log.lock().unwrap();
        assert_eq!(log.written.len(), 2);
        assert!(log.aborts.is_empty());
        assert_eq!(log.released, 1);
    }

    #[test]
    fn test_device_busy() {
        let channel = ScriptedChannel::new().fail_claim(ChannelError::Busy);
        let (mut session, log) = session(channel);

        assert!(matches!(session.connect(), Err(Error::DeviceBusy)));
        assert_eq!(log.lock().unwrap().written.len(), 0);
        assert_eq!(log.lock().unwrap().released, 1);
    }

    #[test]
    fn test_select_failure() {
        let channel = ScriptedChannel::new()
            .reply(slot_status_reply(0x00))
            .reply(parameters_reply(0x01))
            .reply(parameters_reply(0x01))
            .reply(data_block(&[0x6A, 0x82]));
        let (mut session, log) = session(channel);

        let err = session.open_applet().unwrap_err();

        assert!(matches!(
            err,
            Error::SelectApplet(Refusal::Card(sw)) if sw == StatusWord::new(0x6A, 0x82)
        ));
        assert_eq!(log.lock().unwrap().written.len(), 4);
        assert!(matches!(session.get_key_reference(), Err(Error::SessionClosed)));
        assert_eq!(log.lock().unwrap().written.len(), 4);
    }

    #[test]
    fn test_select_reader_failure() {
        let channel = ScriptedChannel::new()
            .reply(slot_status_reply(0x00))
            .reply(parameters_reply(0x01))
            .reply(parameters_reply(0x01))
            .reply(reader_failure(0x42, 0xFE));
        let (mut session, log) = session(channel);

        let err = session.open_applet().unwrap_err();

        assert!(matches!(
            err,
            Error::SelectApplet(Refusal::Reader {
                status: 0x42,
                error: 0xFE
            })
        ));
        assert!(matches!(session.state(), SessionState::Failed(_)));
        let log = log.lock().unwrap();
        assert_eq!(log.written.len(), 4);
        assert_eq!(log.released, 1);
    }

    #[test]
    fn test_time_extension_before_reply() {
        let mut reply = b"https://keys.example/key".to_vec();
        reply.extend_from_slice(&[0x90, 0x00]);
        let channel = ScriptedChannel::new()
            .reply(time_extension())
            .reply(time_extension())
            .reply(data_block(&reply));
        let (mut session, log) = ready_session(channel);

        assert_eq!(session.get_key_reference().unwrap(), "https://keys.example/key");
        let log = log.lock().unwrap();
        assert_eq!(log.apdus().len(), 2);
        assert_eq!(log.reads, 7);
    }

    #[test]
    fn test_key_reference() {
        let mut reply = b"https://keys.example/\xE9".to_vec();
        reply.extend_from_slice(&[0x90, 0x00]);
        let (mut session, log) = ready_session(ScriptedChannel::new().reply(data_block(&reply)));

        let url = session.get_key_reference().unwrap();

        assert_eq!(url, "https://keys.example/é");
        assert_eq!(session.state(), &SessionState::AppletSelected);
        let apdus = log.lock().unwrap().apdus();
        assert_eq!(apdus[1].as_ref(), hex::decode("00ca5f5000").unwrap());

        session.finish().unwrap();
        assert_eq!(session.state(), &SessionState::Complete);
        assert_eq!(log.lock().unwrap().released, 1);
    }

    #[test]
    fn test_get_data_failure() {
        let channel = ScriptedChannel::new()
            .reply(data_block(&[0x6A, 0x88]))
            .reply(data_block(&[0x90, 0x00]));
        let (mut session, log) = ready_session(channel);

        assert!(matches!(
            session.get_key_reference(),
            Err(Error::GetData(Refusal::Card(sw))) if sw == StatusWord::new(0x6A, 0x88)
        ));
        assert!(matches!(session.state(), SessionState::Failed(_)));
        assert!(matches!(session.verify_pin(&Pin::new("123456")), Err(Error::SessionClosed)));

        let log = log.lock().unwrap();
        assert_eq!(log.written.len(), 5);
        assert_eq!(log.released, 1);
    }

    #[test]
    fn test_first_verify_failure_skips_second() {
        let channel = ScriptedChannel::new().reply(data_block(&[0x6A, 0x80]));
        let (mut session, log) = ready_session(channel);

        let err = session.verify_pin(&Pin::new("123456")).unwrap_err();

        assert!(matches!(
            err,
            Error::PinVerification(Refusal::Card(sw)) if sw == StatusWord::new(0x6A, 0x80)
        ));
        let apdus = log.lock().unwrap().apdus();
        assert_eq!(apdus.len(), 2);
        assert_eq!(&apdus[1][..4], &[0x00, 0x20, 0x00, 0x82]);
    }

    #[test]
    fn test_verify_reader_failure() {
        let (mut session, log) = ready_session(ScriptedChannel::new().reply(reader_failure(0x42, 0xFE)));

        let err = session.verify_pin(&Pin::new("123456")).unwrap_err();

        assert!(matches!(
            err,
            Error::PinVerification(Refusal::Reader {
                status: 0x42,
                error: 0xFE
            })
        ));
        let log = log.lock().unwrap();
        assert_eq!(log.apdus().len(), 2);
        assert_eq!(log.released, 1);
    }

    #[test]
    fn test_verify_without_references() {
        let config = CardConfig::default().with_pin_references(Vec::new());
        let channel = ScriptedChannel::new().with_setup();
        let log = channel.log();
        let mut session = CardSession::new(channel, config);
        session.open_applet().unwrap();

        let err = session.verify_pin(&Pin::new("123456")).unwrap_err();

        assert!(matches!(err, Error::InvalidPin(_)));
        assert!(matches!(session.state(), SessionState::Failed(_)));
        assert_eq!(log.lock().unwrap().written.len(), 4);
    }

    #[test]
    fn test_verify_both_references() {
        let channel = ScriptedChannel::new()
            .reply(data_block(&[0x90, 0x00]))
            .reply(data_block(&[0x90, 0x00]));
        let (mut session, log) = ready_session(channel);

        session.verify_pin(&Pin::new("123456")).unwrap();

        assert_eq!(session.state(), &SessionState::PinVerified);
        let apdus = log.lock().unwrap().apdus();
        assert_eq!(apdus[1].as_ref(), hex::decode("0020008206313233343536").unwrap());
        assert_eq!(apdus[2].as_ref(), hex::decode("0020008106313233343536").unwrap());
    }

    #[test]
    fn test_decipher_before_verify_is_rejected() {
        let (mut session, log) = ready_session(ScriptedChannel::new());
        let written = log.lock().unwrap().written.len();

        let err = session.decipher(&[0x00; 10]).unwrap_err();

        assert!(matches!(
            err,
            Error::IllegalTransition {
                from: SessionState::AppletSelected,
                ..
            }
        ));
        assert_eq!(log.lock().unwrap().written.len(), written);
    }

    fn verified_session(channel: ScriptedChannel) -> (CardSession<ScriptedChannel>, Arc<Mutex<ChannelLog>>) {
        let channel = channel
            .reply_first(data_block(&[0x90, 0x00]))
            .reply_first(data_block(&[0x90, 0x00]))
            .with_setup();
        let log = channel.log();
        let mut session = CardSession::new(channel, CardConfig::default());
        session.open_applet().unwrap();
        session.verify_pin(&Pin::new("123456")).unwrap();
        (session, log)
    }

    #[test]
    fn test_decipher_chunks() {
        let (mut session, log) = verified_session(ScriptedChannel::new().reply(data_block(&[0x90, 0x00])));
        let data = vec![0x5A; 257];

        session.decipher(&data).unwrap();

        assert_eq!(session.state(), &SessionState::AwaitingResult { attempt: 0 });
        let log = log.lock().unwrap();
        let apdus = log.apdus();
        let first = &apdus[3];
        let last = &apdus[4];
        assert_eq!(&first[..5], &[0x10, 0x2A, 0x80, 0x86, 0xFE]);
        assert_eq!(first.len(), 259);
        assert_eq!(last.as_ref(), &[0x00, 0x2A, 0x80, 0x86, 0x03, 0x5A, 0x5A, 0x5A, 0x00]);
        // the final chunk is written without reading its reply
        assert_eq!(log.reads, 7);

        let frame = log.written.last().unwrap();
        assert_eq!(&frame[..10], &[0x6F, 0x09, 0, 0, 0, 0, 7, 0, 0, 0]);
    }

    #[test]
    fn test_decipher_transfer_failure() {
        let (mut session, log) =
            verified_session(ScriptedChannel::new().reply(data_block(&[0x69, 0x82])));

        let err = session.decipher(&[0x5A; 300]).unwrap_err();

        assert!(matches!(
            err,
            Error::DecipherTransfer {
                chunk: 0,
                status: Refusal::Card(_)
            }
        ));
        assert_eq!(log.lock().unwrap().apdus().len(), 4);
    }

    #[test]
    fn test_await_result_with_continuation() {
        let mut first = vec![0x09];
        first.extend_from_slice(&[0x11; 16]);
        first.extend_from_slice(&[0x61, 18]);
        let mut last = vec![0x11; 16];
        last.extend_from_slice(&[0x02, 0x20, 0x90, 0x00]);

        let channel = ScriptedChannel::new()
            .reply_timeout()
            .reply(time_extension())
            .reply(data_block(&first))
            .reply(data_block(&last));
        let (mut session, log) = verified_session(channel);
        session.decipher(&[0x5A; 10]).unwrap();
        let mut sleeper = RecordingSleeper::default();

        let key = session.await_result(&mut sleeper).unwrap();

        assert_eq!(key.key.as_slice(), &[0x11; 32]);
        assert_eq!(key.checksum, 0x0220);
        assert_eq!(session.state(), &SessionState::Complete);
        assert_eq!(sleeper.sleeps.len(), 3);

        let log = log.lock().unwrap();
        let get_response = log.apdus().last().unwrap().clone();
        assert_eq!(get_response.as_ref(), &[0x00, 0xC0, 0x00, 0x00, 18]);
        assert_eq!(log.released, 1);
    }

    #[test]
    fn test_await_result_timeout() {
        let (mut session, log) = verified_session(ScriptedChannel::new());
        session.decipher(&[0x5A; 10]).unwrap();
        let written = log.lock().unwrap().written.len();
        let mut sleeper = RecordingSleeper::default();

        let err = session.await_result(&mut sleeper).unwrap_err();

        assert!(matches!(err, Error::TapTimeout { attempts: 20 }));
        assert!(matches!(session.state(), SessionState::Failed(_)));
        let log = log.lock().unwrap();
        assert_eq!(log.written.len(), written);
        assert_eq!(log.released, 1);
    }
}
