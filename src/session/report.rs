//! Session outcome summary.

use std::time::Duration;

use super::remote::RemoteNode;
use super::state::Side;

/// What a finished session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Our role.
    pub side: Side,
    /// Remote node details.
    pub remote: RemoteNode,
    /// Whether a password protected the session.
    pub secure: bool,
    /// Whether the password was exchanged as a CRAM-MD5 digest.
    pub cram_md5: bool,
    /// Whether FILE lines carried CRCs.
    pub crc: bool,
    /// Names acknowledged by the remote with `GOT`.
    pub sent: Vec<String>,
    /// Names the remote refused with `SKIP`.
    pub skipped: Vec<String>,
    /// Names received and delivered to the sink.
    pub received: Vec<String>,
    /// Names we refused with `SKIP`.
    pub refused: Vec<String>,
    /// File bytes written in data frames.
    pub bytes_sent: u64,
    /// File bytes read from data frames.
    pub bytes_received: u64,
    /// Wall time since the session was created.
    pub elapsed: Duration,
}

impl SessionReport {
    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} session with {}: sent {} ({} bytes), received {} ({} bytes), skipped {}, refused {}{}",
            self.side,
            self.remote.primary_address(),
            self.sent.len(),
            self.bytes_sent,
            self.received.len(),
            self.bytes_received,
            self.skipped.len(),
            self.refused.len(),
            match (self.secure, self.cram_md5) {
                (true, true) => ", secure (CRAM-MD5)",
                (true, false) => ", secure",
                _ => "",
            },
        )
    }
}
