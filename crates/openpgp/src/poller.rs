//! Bounded polling for the decipher result
//!
//! Once the last PSO:DECIPHER chunk is on the card, the reply is held back until the
//! user taps the key. The poller keeps reading until the card answers with `90 00`,
//! runs out of attempts, or hits a hard error. A `61 XX` answer delivers part of the
//! result and is followed by GET RESPONSE for the `XX` remaining bytes.

use std::{fmt, thread, time::Duration};

use cardvault_apdu::Response;
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Pause between polls
pub trait Sleeper {
    /// Block for `duration`
    fn sleep(&mut self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &mut S {
    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Outcome of one result read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// Nothing usable arrived yet
    NotReady,
    /// The card answered with a status word
    Response(Response),
}

/// Where the poller reads results from
pub trait ResultSource {
    /// Perform read number `attempt` (starting at 1)
    fn read_result(&mut self, attempt: u32) -> Result<Poll>;

    /// Ask the card for the `remaining` bytes announced by a `61 XX` status
    fn request_more(&mut self, remaining: u8) -> Result<()>;
}

/// Decipher result once the card reports `90 00`
pub struct RecoveredKey {
    /// Symmetric algorithm id from the first result byte
    pub algorithm: u8,
    /// Session key bytes
    pub key: Zeroizing<Vec<u8>>,
    /// Checksum trailing the key
    pub checksum: u16,
}

impl fmt::Debug for RecoveredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveredKey")
            .field("algorithm", &self.algorithm)
            .field("key_len", &self.key.len())
            .finish_non_exhaustive()
    }
}

/// Bounded read loop for the decipher result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPoller {
    interval: Duration,
    attempts: u32,
    expected_algorithm: Option<u8>,
}

impl ResultPoller {
    /// Poller making at most `attempts` reads, `interval` apart
    pub const fn new(interval: Duration, attempts: u32) -> Self {
        Self {
            interval,
            attempts,
            expected_algorithm: None,
        }
    }

    /// Reject results whose algorithm byte differs from `algorithm`
    pub const fn with_expected_algorithm(mut self, algorithm: Option<u8>) -> Self {
        self.expected_algorithm = algorithm;
        self
    }

    /// Maximum number of reads
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Read from `source` until the result is complete
    ///
    /// No sleep follows the final `90 00` or the last permitted read.
    pub fn poll<R, S>(&self, source: &mut R, sleeper: &mut S) -> Result<RecoveredKey>
    where
        R: ResultSource + ?Sized,
        S: Sleeper + ?Sized,
    {
        let mut accumulator = Accumulator::default();

        for attempt in 1..=self.attempts {
            match source.read_result(attempt)? {
                Poll::Response(response) if response.is_success() => {
                    debug!(attempt, "Decipher result complete");
                    return accumulator.finish(response.data(), self.expected_algorithm);
                }
                Poll::Response(response) if response.more_data_available() => {
                    let remaining = response.status().sw2;
                    debug!(attempt, remaining, "Partial decipher result");
                    accumulator.push_partial(response.data(), self.expected_algorithm)?;
                    source.request_more(remaining)?;
                }
                Poll::Response(response) => {
                    trace!(attempt, status = %response.status(), "Card not ready");
                }
                Poll::NotReady => trace!(attempt, "No result yet"),
            }

            if attempt < self.attempts {
                sleeper.sleep(self.interval);
            }
        }

        Err(Error::TapTimeout {
            attempts: self.attempts,
        })
    }
}

#[derive(Default)]
struct Accumulator {
    algorithm: Option<u8>,
    key: Zeroizing<Vec<u8>>,
}

impl Accumulator {
    /// Strip the algorithm byte from the first chunk and check it
    fn take_algorithm<'a>(&mut self, data: &'a [u8], expected: Option<u8>) -> Result<&'a [u8]> {
        if self.algorithm.is_some() {
            return Ok(data);
        }

        let [algorithm, rest @ ..] = data else {
            return Err(Error::MalformedResult("missing algorithm byte"));
        };
        if let Some(expected) = expected {
            if *algorithm != expected {
                return Err(Error::UnknownKeyAlgorithm(*algorithm));
            }
        }
        self.algorithm = Some(*algorithm);
        Ok(rest)
    }

    fn push_partial(&mut self, data: &[u8], expected: Option<u8>) -> Result<()> {
        let data = self.take_algorithm(data, expected)?;
        self.key.extend_from_slice(data);
        Ok(())
    }

    fn finish(mut self, data: &[u8], expected: Option<u8>) -> Result<RecoveredKey> {
        self.push_partial(data, expected)?;

        // The checksum may straddle a 61 XX boundary, so strip it from the whole result
        let Some(split) = self.key.len().checked_sub(2) else {
            return Err(Error::MalformedResult("missing session key checksum"));
        };
        let checksum = u16::from_be_bytes([self.key[split], self.key[split + 1]]);
        self.key.truncate(split);

        Ok(RecoveredKey {
            algorithm: self.algorithm.unwrap_or_default(),
            key: self.key,
            checksum,
        })
    }
}
