//! Frame encoding and decoding for binkp.
//!
//! Wire format:
//! ```text
//! +---+----------------+-----------------------------------+
//! | T | Length (15 b)  | Payload (Length bytes)            |
//! +---+----------------+-----------------------------------+
//!   T = 1: command frame, payload = id byte + argument
//!   T = 0: data frame, payload = raw file bytes
//! ```
//!
//! The header is a big-endian u16.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use super::command::{Command, CommandId};
use crate::core::{
    BinkpResult, COMMAND_FLAG, DATA_RECEIVE_TIMEOUT, FRAME_HEADER_SIZE, LENGTH_MASK,
    MAX_PAYLOAD_SIZE,
};
use crate::transport::Transport;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Command id outside 0..=10.
    #[error("unknown command id: {0}")]
    UnknownCommand(u8),

    /// Command frame without even the id byte.
    #[error("command frame with empty payload")]
    EmptyCommand,

    /// Payload does not fit the 15-bit length field.
    #[error("payload of {0} bytes exceeds the 32767 byte frame limit")]
    TooLong(usize),
}

/// The 2-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Command frame (bit 15 set) or data frame.
    pub is_command: bool,
    /// Payload length (bits 0-14).
    pub length: u16,
}

impl FrameHeader {
    /// Create a header, checking the length fits in 15 bits.
    pub fn new(is_command: bool, length: usize) -> Result<Self, FrameError> {
        if length > MAX_PAYLOAD_SIZE {
            return Err(FrameError::TooLong(length));
        }
        Ok(Self {
            is_command,
            length: length as u16,
        })
    }

    /// Parse a header from its u16 value.
    pub fn from_u16(value: u16) -> Self {
        Self {
            is_command: value & COMMAND_FLAG != 0,
            length: value & LENGTH_MASK,
        }
    }

    /// Parse a header from bytes.
    pub fn from_bytes(bytes: [u8; FRAME_HEADER_SIZE]) -> Self {
        Self::from_u16(u16::from_be_bytes(bytes))
    }

    /// The header as a u16.
    pub fn as_u16(&self) -> u16 {
        let flag = if self.is_command { COMMAND_FLAG } else { 0 };
        flag | (self.length & LENGTH_MASK)
    }

    /// Serialize the header (2 bytes, big-endian).
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        self.as_u16().to_be_bytes()
    }
}

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Command frame.
    Command(Command),
    /// Data frame carrying a fragment of the current file.
    Data(Vec<u8>),
}

impl Frame {
    /// Create a command frame.
    pub fn command(id: CommandId, argument: impl Into<Vec<u8>>) -> Self {
        Frame::Command(Command::new(id, argument))
    }

    /// Create a data frame.
    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Frame::Data(bytes.into())
    }

    /// Check if this is a command frame.
    pub fn is_command(&self) -> bool {
        matches!(self, Frame::Command(_))
    }

    /// Payload length as it appears in the header.
    pub fn payload_len(&self) -> usize {
        match self {
            Frame::Command(cmd) => 1 + cmd.argument.len(),
            Frame::Data(bytes) => bytes.len(),
        }
    }

    /// Header for this frame.
    pub fn header(&self) -> Result<FrameHeader, FrameError> {
        FrameHeader::new(self.is_command(), self.payload_len())
    }

    /// Serialize header and payload.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let header = self.header()?;
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload_len());
        buf.extend_from_slice(&header.to_bytes());
        match self {
            Frame::Command(cmd) => {
                buf.push(cmd.id.as_byte());
                buf.extend_from_slice(&cmd.argument);
            }
            Frame::Data(bytes) => buf.extend_from_slice(bytes),
        }
        Ok(buf)
    }

    /// Build a frame from a header and its complete payload.
    pub fn from_payload(header: FrameHeader, payload: Vec<u8>) -> Result<Self, FrameError> {
        if !header.is_command {
            return Ok(Frame::Data(payload));
        }
        let (&id, argument) = payload.split_first().ok_or(FrameError::EmptyCommand)?;
        let id = CommandId::from_byte(id).ok_or(FrameError::UnknownCommand(id))?;
        Ok(Frame::Command(Command::new(id, argument)))
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` until a whole frame is available, otherwise the
    /// frame and the number of bytes it occupied.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, FrameError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let header = FrameHeader::from_bytes([buf[0], buf[1]]);
        let end = FRAME_HEADER_SIZE + header.length as usize;
        if buf.len() < end {
            return Ok(None);
        }
        let frame = Self::from_payload(header, buf[FRAME_HEADER_SIZE..end].to_vec())?;
        Ok(Some((frame, end)))
    }
}

/// Read one frame, waiting at most `limit` for it to start.
///
/// Once the header is in, the payload gets at least [`DATA_RECEIVE_TIMEOUT`]
/// since a frame cut short desynchronizes the stream.
pub async fn read_frame<S>(transport: &mut Transport<S>, limit: Duration) -> BinkpResult<Frame>
where
    S: AsyncRead + AsyncWrite,
{
    let header = FrameHeader::from_u16(transport.read_u16(limit).await?);
    let payload = transport
        .receive_exact(header.length as usize, limit.max(DATA_RECEIVE_TIMEOUT))
        .await?;
    Ok(Frame::from_payload(header, payload)?)
}

/// Return a frame if one is already complete in the receive buffer.
///
/// Never waits for the network.
pub async fn try_read_frame<S>(transport: &mut Transport<S>) -> BinkpResult<Option<Frame>>
where
    S: AsyncRead + AsyncWrite,
{
    transport.poll_ready().await?;
    match Frame::decode(transport.buffered())? {
        Some((frame, used)) => {
            transport.consume(used);
            Ok(Some(frame))
        }
        None => Ok(None),
    }
}

/// Write one frame, waiting at most `limit`.
pub async fn write_frame<S>(
    transport: &mut Transport<S>,
    frame: &Frame,
    limit: Duration,
) -> BinkpResult<()>
where
    S: AsyncRead + AsyncWrite,
{
    let bytes = frame.encode()?;
    transport.send(&bytes, limit).await?;
    Ok(())
}
