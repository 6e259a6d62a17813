//! Decryption orchestrator
//!
//! Ties a channel provider to the card session: every call acquires a fresh channel,
//! runs the full session on it, and hands back the result. Errors from any step are
//! returned as raised by the session.

use std::fmt;

use cardvault_ccid::ChannelProvider;
use tracing::{debug, instrument};

use crate::{
    CardConfig, CipherPayload, Error, Pin, Result, SessionKey,
    poller::{RecoveredKey, Sleeper, ThreadSleeper},
    session::CardSession,
    types::session_key_checksum,
};

/// Callback invoked when the card waits for the user to tap it
pub type TapRequestFn = Box<dyn Fn() + Send + Sync>;

/// Recovers session keys and reads the key reference from an OpenPGP card
pub struct Decrypter<P, S = ThreadSleeper> {
    provider: P,
    config: CardConfig,
    sleeper: S,
    tap_callback: Option<TapRequestFn>,
}

impl<P: ChannelProvider> Decrypter<P> {
    /// Decrypter acquiring channels from `provider`
    pub const fn new(provider: P, config: CardConfig) -> Self {
        Self {
            provider,
            config,
            sleeper: ThreadSleeper,
            tap_callback: None,
        }
    }
}

impl<P: ChannelProvider, S: Sleeper> Decrypter<P, S> {
    /// Replace the sleeper used between result polls
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> Decrypter<P, T> {
        Decrypter {
            provider: self.provider,
            config: self.config,
            sleeper,
            tap_callback: self.tap_callback,
        }
    }

    /// Call `callback` once the card waits for the tap
    pub fn with_tap_callback(mut self, callback: TapRequestFn) -> Self {
        self.tap_callback = Some(callback);
        self
    }

    /// Configuration in use
    pub const fn config(&self) -> &CardConfig {
        &self.config
    }

    /// Sleeper in use
    pub const fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Read the public key URL stored on the card
    #[instrument(level = "debug", skip_all)]
    pub fn key_reference(&mut self) -> Result<String> {
        let mut session = self.open_session()?;
        let reference = session.get_key_reference()?;
        session.finish()?;
        Ok(reference)
    }

    /// Recover the session key encrypted in `payload`
    ///
    /// Runs the whole card session: setup, key reference, PIN verification, the
    /// decipher chain and the wait for the tap.
    #[instrument(level = "debug", skip_all, fields(payload_len = payload.len()))]
    pub fn decrypt(&mut self, payload: &CipherPayload, pin: &Pin) -> Result<SessionKey> {
        let data = payload.decipher_data(self.config.padding_indicator)?;
        pin.apdu_data()?;

        let mut session = self.open_session()?;
        let reference = session.get_key_reference()?;
        debug!(%reference, "Card key reference");

        session.verify_pin(pin)?;
        session.decipher(&data)?;

        debug!("Waiting for the security key tap");
        if let Some(callback) = &self.tap_callback {
            callback();
        }

        let recovered = session.await_result(&mut self.sleeper)?;
        self.session_key(recovered)
    }

    /// Decrypt each payload in its own session, stopping at the first error
    pub fn decrypt_all(&mut self, payloads: &[CipherPayload], pin: &Pin) -> Result<Vec<SessionKey>> {
        payloads
            .iter()
            .enumerate()
            .map(|(index, payload)| {
                debug!(index, total = payloads.len(), "Decrypting payload");
                self.decrypt(payload, pin)
            })
            .collect()
    }

    fn open_session(&mut self) -> Result<CardSession<P::Channel>> {
        let channel = self.provider.acquire()?;
        let mut session = CardSession::new(channel, self.config.clone());
        session.open_applet()?;
        Ok(session)
    }

    fn session_key(&self, recovered: RecoveredKey) -> Result<SessionKey> {
        if self.config.verify_checksum {
            let computed = session_key_checksum(&recovered.key);
            if computed != recovered.checksum {
                return Err(Error::SessionKeyChecksum {
                    expected: recovered.checksum,
                    computed,
                });
            }
        }
        debug!(algorithm = recovered.algorithm, len = recovered.key.len(), "Recovered session key");
        Ok(SessionKey::new(recovered.algorithm, recovered.key))
    }
}

impl<P: fmt::Debug, S: fmt::Debug> fmt::Debug for Decrypter<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decrypter")
            .field("provider", &self.provider)
            .field("config", &self.config)
            .field("sleeper", &self.sleeper)
            .field("tap_callback", &self.tap_callback.is_some())
            .finish()
    }
}
