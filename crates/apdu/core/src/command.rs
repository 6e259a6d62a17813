//! APDU command definitions
//!
//! Short command APDUs as sent to the OpenPGP application:
//!
//! ```text
//! CLA INS P1 P2 [Lc data...] [Le]
//! ```
//!
//! `Lc` is a single byte, so a command carries at most [`MAX_SHORT_DATA`] data bytes.
//! Larger logical payloads go through [`chain`].

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{Error, Result};

/// Largest data field carried by one short command APDU
pub const MAX_SHORT_DATA: usize = 254;

/// Class bit announcing that more commands of the same chain follow
pub const CLA_CHAINING: u8 = 0x10;

/// Instruction byte of GET RESPONSE
pub const INS_GET_RESPONSE: u8 = 0xC0;

/// Generic short APDU command
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected response length (optional)
    pub le: Option<u8>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// GET RESPONSE asking for the `remaining` bytes announced by a `61 XX` status
    pub const fn get_response(remaining: u8) -> Self {
        Self::new_with_le(0x00, INS_GET_RESPONSE, 0x00, 0x00, remaining)
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Set or clear the chaining bit in the class byte
    pub const fn with_chaining(mut self, more_follows: bool) -> Self {
        if more_follows {
            self.cla |= CLA_CHAINING;
        } else {
            self.cla &= !CLA_CHAINING;
        }
        self
    }

    /// Whether further commands of the same logical APDU follow this one
    pub const fn is_chained(&self) -> bool {
        self.cla & CLA_CHAINING != 0
    }

    /// Length of the data field, zero when absent
    pub fn data_len(&self) -> usize {
        self.data.as_ref().map_or(0, Bytes::len)
    }

    /// Serialized length of the command
    pub fn command_length(&self) -> usize {
        let mut length = 4;
        if self.data.is_some() {
            length += 1 + self.data_len();
        }
        if self.le.is_some() {
            length += 1;
        }
        length
    }

    /// Convert to raw APDU bytes
    ///
    /// # Errors
    /// Returns [`Error::DataTooLong`] when the data exceeds [`MAX_SHORT_DATA`].
    pub fn to_bytes(&self) -> Result<Bytes> {
        let data = self.data.as_deref();
        let mut buffer = encode_short(self.cla, self.ins, self.p1, self.p2, data.unwrap_or(&[]))?;
        if data.is_none() {
            // encode_short always writes Lc; a bare header has none
            buffer.truncate(4);
        }

        match self.le {
            Some(le) => {
                let mut with_le = BytesMut::with_capacity(buffer.len() + 1);
                with_le.put_slice(&buffer);
                with_le.put_u8(le);
                Ok(with_le.freeze())
            }
            None => Ok(buffer),
        }
    }

    /// Parse a command from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::InvalidCommandLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);

        match data.len() {
            4 => {}
            5 => command.le = Some(data[4]),
            len => {
                let lc = data[4] as usize;
                if len == 5 + lc {
                    command.data = Some(Bytes::copy_from_slice(&data[5..]));
                } else if len == 6 + lc {
                    command.data = Some(Bytes::copy_from_slice(&data[5..5 + lc]));
                    command.le = Some(data[5 + lc]);
                } else {
                    return Err(Error::InvalidCommandLength(len));
                }
            }
        }

        Ok(command)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Data is deliberately left out, commands may carry PINs or cryptograms
        f.debug_struct("Command")
            .field("cla", &format_args!("{:#04x}", self.cla))
            .field("ins", &format_args!("{:#04x}", self.ins))
            .field("p1", &format_args!("{:#04x}", self.p1))
            .field("p2", &format_args!("{:#04x}", self.p2))
            .field("data_len", &self.data_len())
            .field("le", &self.le)
            .finish()
    }
}

/// Encode a short command APDU: header, a single `Lc` byte, then `data`
///
/// # Errors
/// Returns [`Error::DataTooLong`] when `data` exceeds [`MAX_SHORT_DATA`].
pub fn encode_short(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Result<Bytes> {
    if data.len() > MAX_SHORT_DATA {
        return Err(Error::DataTooLong {
            len: data.len(),
            max: MAX_SHORT_DATA,
        });
    }

    let mut buffer = BytesMut::with_capacity(5 + data.len());
    buffer.put_u8(cla);
    buffer.put_u8(ins);
    buffer.put_u8(p1);
    buffer.put_u8(p2);
    buffer.put_u8(data.len() as u8);
    buffer.put_slice(data);

    trace!(
        cla = format_args!("{cla:#04x}"),
        ins = format_args!("{ins:#04x}"),
        lc = data.len(),
        "Encoded short APDU"
    );

    Ok(buffer.freeze())
}

/// Split `data` into a command chain based on `template`'s header
///
/// Produces `ceil(data.len() / chunk_size)` commands. Every command except the
/// last carries [`CLA_CHAINING`]; the last one has it cleared. The template's
/// data and `Le` are ignored. Empty data yields an empty chain.
///
/// # Errors
/// Returns [`Error::InvalidChunkSize`] when `chunk_size` is zero or larger than
/// [`MAX_SHORT_DATA`].
pub fn chain(template: &Command, data: &[u8], chunk_size: usize) -> Result<Vec<Command>> {
    if chunk_size == 0 || chunk_size > MAX_SHORT_DATA {
        return Err(Error::InvalidChunkSize(chunk_size));
    }

    let count = data.len().div_ceil(chunk_size);
    let commands = data
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk)| {
            Command::new(template.cla, template.ins, template.p1, template.p2)
                .with_data(Bytes::copy_from_slice(chunk))
                .with_chaining(index + 1 < count)
        })
        .collect();

    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode_response;

    #[test]
    fn test_command_serialization() {
        let aid = Bytes::from_static(&[0xD2, 0x76, 0x00, 0x01, 0x24, 0x01]);
        let cmd = Command::new_with_data(0x00, 0xA4, 0x04, 0x00, aid);
        let bytes = cmd.to_bytes().unwrap();

        assert_eq!(bytes.as_ref(), hex::decode("00a4040006d27600012401").unwrap());
    }

    #[test]
    fn test_command_without_data() {
        let cmd = Command::new_with_le(0x00, 0xCA, 0x5F, 0x50, 0x00);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), &[0x00, 0xCA, 0x5F, 0x50, 0x00]);
        assert_eq!(cmd.command_length(), 5);

        let bare = Command::new(0x00, 0xB0, 0x00, 0x00);
        assert_eq!(bare.to_bytes().unwrap().as_ref(), &[0x00, 0xB0, 0x00, 0x00]);
    }

    #[test]
    fn test_get_response() {
        let cmd = Command::get_response(0x28);
        assert_eq!(cmd.to_bytes().unwrap().as_ref(), &[0x00, 0xC0, 0x00, 0x00, 0x28]);
    }

    #[test]
    fn test_encode_short_limits() {
        let max = vec![0xAB; MAX_SHORT_DATA];
        let bytes = encode_short(0x00, 0x2A, 0x80, 0x86, &max).unwrap();
        assert_eq!(bytes.len(), 5 + MAX_SHORT_DATA);
        assert_eq!(bytes[4], 0xFE);

        let too_long = vec![0xAB; MAX_SHORT_DATA + 1];
        assert_eq!(
            encode_short(0x00, 0x2A, 0x80, 0x86, &too_long),
            Err(Error::DataTooLong { len: 255, max: 254 })
        );
    }

    #[test]
    fn test_header_survives_encode_and_decode() {
        for len in [0usize, 1, 6, 100, MAX_SHORT_DATA] {
            let data = vec![0x5A; len];
            let bytes = encode_short(0x10, 0x2A, 0x80, 0x86, &data).unwrap();

            let cmd = Command::from_bytes(&bytes).unwrap();
            assert_eq!((cmd.cla, cmd.ins, cmd.p1, cmd.p2), (0x10, 0x2A, 0x80, 0x86));
            assert_eq!(cmd.data_len(), len);
            assert!(cmd.is_chained());

            // Read back as a response, the header is the leading part of the data
            let resp = decode_response(&bytes).unwrap();
            assert_eq!(resp.data().len() + 2, bytes.len());
            if len >= 2 {
                assert_eq!(&resp.data()[..4], &[0x10, 0x2A, 0x80, 0x86]);
            }
        }
    }

    #[test]
    fn test_command_from_bytes() {
        let cmd = Command::from_bytes(&[0x00, 0xA4, 0x04, 0x00]).unwrap();
        assert!(cmd.data.is_none());
        assert!(cmd.le.is_none());

        let cmd = Command::from_bytes(&[0x00, 0xB0, 0x00, 0x00, 0xFF]).unwrap();
        assert!(cmd.data.is_none());
        assert_eq!(cmd.le, Some(0xFF));

        let cmd = Command::from_bytes(&[0x00, 0xA4, 0x04, 0x00, 0x03, 0x01, 0x02, 0x03, 0x00]).unwrap();
        assert_eq!(cmd.data.as_deref(), Some(&[0x01, 0x02, 0x03][..]));
        assert_eq!(cmd.le, Some(0x00));

        assert_eq!(
            Command::from_bytes(&[0x00, 0xA4, 0x04, 0x00, 0x05, 0x01]),
            Err(Error::InvalidCommandLength(6))
        );
    }

    #[test]
    fn test_chaining_bit() {
        let cmd = Command::new(0x00, 0x2A, 0x80, 0x86).with_chaining(true);
        assert_eq!(cmd.cla, 0x10);
        assert!(cmd.is_chained());

        let cmd = cmd.with_chaining(false);
        assert_eq!(cmd.cla, 0x00);
        assert!(!cmd.is_chained());
    }

    #[test]
    fn test_chain_counts() {
        let template = Command::new(0x00, 0x2A, 0x80, 0x86);

        for len in [1usize, 253, 254, 255, 257, 508, 509, 1000] {
            let data = vec![0x11; len];
            let commands = chain(&template, &data, MAX_SHORT_DATA).unwrap();
            assert_eq!(commands.len(), len.div_ceil(MAX_SHORT_DATA), "len {len}");

            let (last, rest) = commands.split_last().unwrap();
            assert!(rest.iter().all(Command::is_chained));
            assert!(!last.is_chained());
            assert_eq!(commands.iter().map(Command::data_len).sum::<usize>(), len);
        }

        assert!(chain(&template, &[], MAX_SHORT_DATA).unwrap().is_empty());
    }

    #[test]
    fn test_chain_257_bytes() {
        let data: Vec<u8> = (0..257u16).map(|i| i as u8).collect();
        let commands = chain(&Command::new(0x00, 0x2A, 0x80, 0x86), &data, 254).unwrap();

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].cla, CLA_CHAINING);
        assert_eq!(commands[0].data_len(), 254);
        assert_eq!(commands[1].cla, 0x00);
        assert_eq!(commands[1].data.as_deref(), Some(&data[254..]));
    }

    #[test]
    fn test_chain_rejects_bad_chunk_size() {
        let template = Command::new(0x00, 0x2A, 0x80, 0x86);
        assert_eq!(chain(&template, &[1], 0), Err(Error::InvalidChunkSize(0)));
        assert_eq!(chain(&template, &[1], 255), Err(Error::InvalidChunkSize(255)));
    }
}
