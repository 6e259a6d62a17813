//! Utility functions for APDU response handling

use tracing::debug;

use crate::response::status::StatusWord;
use crate::{Error, Result};

/// Split raw response bytes into the status word and the data before it
///
/// # Errors
/// Returns [`Error::Incomplete`] if the data is too short to contain a status word.
pub fn split_status(data: &[u8]) -> Result<(StatusWord, &[u8])> {
    match data {
        [payload @ .., sw1, sw2] => Ok((StatusWord::new(*sw1, *sw2), payload)),
        _ => {
            debug!("Response too short: {} bytes", data.len());
            Err(Error::Incomplete(data.len()))
        }
    }
}

/// Decode response data as text, one byte per character (ISO 8859-1)
pub fn latin1_to_string(data: &[u8]) -> String {
    data.iter().copied().map(char::from).collect()
}
