//! APDU response definitions
//!
//! A response is the data returned by the card followed by the two status bytes
//! `SW1 SW2`.

pub mod status;
pub mod utils;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::Result;
use status::StatusWord;

/// Decoded APDU response
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    /// Response data, possibly empty
    data: Bytes,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Create a new response with data and status
    pub fn new(data: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            data: data.into(),
            status: status.into(),
        }
    }

    /// Create a `90 00` response
    pub const fn success(data: Bytes) -> Self {
        Self {
            data,
            status: status::common::SUCCESS,
        }
    }

    /// Create a response without data
    pub fn error(status: impl Into<StatusWord>) -> Self {
        Self::new(Bytes::new(), status)
    }

    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let (status, data) = utils::split_status(raw)?;

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            data_len = data.len(),
            "Parsed APDU response"
        );

        Ok(Self {
            data: Bytes::copy_from_slice(data),
            status,
        })
    }

    /// Response data without the status word
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Whether the status word is `90 00`
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the card holds more response data (`61 XX`)
    pub const fn more_data_available(&self) -> bool {
        self.status.is_more_data_available()
    }

    /// Bytes announced by a `61 XX` status
    pub const fn bytes_available(&self) -> Option<u8> {
        self.status.remaining_bytes()
    }

    /// Serialize back into `data || SW1 SW2`
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() + 2);
        buf.put_slice(&self.data);
        buf.put_u8(self.status.sw1);
        buf.put_u8(self.status.sw2);
        buf.freeze()
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Response data may be key material, only its size is shown
        f.debug_struct("Response")
            .field("data_len", &self.data.len())
            .field("status", &self.status)
            .finish()
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = crate::Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        Self::from_bytes(data)
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        response.to_bytes()
    }
}

/// Decode raw response bytes: trailing two bytes are the status word, the rest is data
pub fn decode_response(raw: &[u8]) -> Result<Response> {
    Response::from_bytes(raw)
}
