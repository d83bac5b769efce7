//! Transport layer error types.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No resolved address accepted the connection.
    #[error("cannot connect to {host}:{port}: {reason}")]
    Connect {
        /// Host name or address literal.
        host: String,
        /// TCP port.
        port: u16,
        /// Last failure seen while trying the candidates.
        reason: String,
    },

    /// I/O error (socket operations).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The deadline of a blocking operation elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the stream, or the transport was closed locally.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Check if this error came from a deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
