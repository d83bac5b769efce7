//! Error types for the binkp session layer.

use std::time::Duration;

use thiserror::Error;

use crate::frame::{CommandId, FrameError};
use crate::session::SessionState;
use crate::transport::TransportError;

/// Violations of the binkp framing or command rules.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame itself could not be decoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A command arrived in a state that does not allow it.
    #[error("unexpected {command} in state {state}")]
    UnexpectedCommand {
        /// Command received.
        command: CommandId,
        /// State the session was in.
        state: SessionState,
    },

    /// A data frame arrived with no file open.
    #[error("unexpected data frame in state {state}")]
    UnexpectedData {
        /// State the session was in.
        state: SessionState,
    },

    /// A command argument did not parse.
    #[error("malformed {command} argument: '{argument}'")]
    MalformedArgument {
        /// Command carrying the argument.
        command: CommandId,
        /// Raw argument text.
        argument: String,
    },

    /// The peer sent more bytes than the FILE line announced.
    #[error("received {received} bytes for '{name}', announced {expected}")]
    DataOverrun {
        /// File being received.
        name: String,
        /// Size from the FILE line.
        expected: u64,
        /// Bytes received so far.
        received: u64,
    },

    /// The session already reached `Terminated`.
    #[error("session already terminated")]
    Terminated,
}

/// Authentication failures while negotiating with the remote node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No expected address in the remote list and no password to fall back on.
    ///
    /// Answered with `BSY`.
    #[error("address list '{0}' not recognized")]
    AddressRejected(String),

    /// No expected address in the remote list on a password protected link.
    #[error("unexpected addresses '{0}'")]
    UnknownAddress(String),

    /// The remote sent an empty `ADR`.
    #[error("remote presented no addresses")]
    NoAddress,

    /// The remote password did not match.
    #[error("incorrect password")]
    PasswordMismatch,

    /// A `CRAM-` password we cannot check: another digest, or no challenge
    /// was offered.
    #[error("CRAM authentication failed: {0}")]
    Cram(String),
}

/// Top-level binkp session errors.
#[derive(Debug, Error)]
pub enum BinkpError {
    /// Socket-level failure.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// A deadline elapsed on a blocking operation.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Framing or command violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Authentication failure.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The remote answered `BSY`.
    #[error("remote busy: {0}")]
    PeerBusy(String),

    /// The remote answered `ERR`.
    #[error("remote error: {0}")]
    Remote(String),

    /// Local file I/O (transfer items, inbound sink).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<TransportError> for BinkpError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after) => BinkpError::Timeout(after),
            other => BinkpError::Transport(other),
        }
    }
}

impl From<FrameError> for BinkpError {
    fn from(err: FrameError) -> Self {
        BinkpError::Protocol(ProtocolError::Frame(err))
    }
}

impl BinkpError {
    /// Command sent best-effort to the remote before the session terminates.
    ///
    /// Transport failures get no reply since the socket is gone; a busy or
    /// failing remote already knows.
    pub fn reply(&self) -> Option<CommandId> {
        match self {
            BinkpError::Auth(AuthError::AddressRejected(_)) => Some(CommandId::Bsy),
            BinkpError::Auth(_)
            | BinkpError::Protocol(_)
            | BinkpError::Timeout(_)
            | BinkpError::Io(_) => Some(CommandId::Err),
            BinkpError::Transport(_)
            | BinkpError::PeerBusy(_)
            | BinkpError::Remote(_)
            | BinkpError::Config(_) => None,
        }
    }

    /// Check if this error came from a deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BinkpError::Timeout(_))
    }
}

/// Result type for session operations.
pub type BinkpResult<T> = Result<T, BinkpError>;
