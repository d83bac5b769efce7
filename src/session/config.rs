//! Per-session configuration.

use std::fmt;
use std::time::Duration;

use super::state::Side;
use crate::core::{
    COMMAND_SEND_TIMEOUT, DATA_SEND_TIMEOUT, DEFAULT_CHUNK_SIZE, EMPTY_PASSWORD,
    HANDSHAKE_TIMEOUT, IDLE_TIMEOUT, MAX_PAYLOAD_SIZE,
};

/// Everything a session needs to know before the first byte is exchanged.
///
/// Not renegotiated mid-session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Our role.
    pub side: Side,
    /// Addresses sent in our `ADR`.
    pub local_addresses: Vec<String>,
    /// Remote addresses we accept. Empty accepts any address.
    pub expected_addresses: Vec<String>,
    /// Session password. `None` means an unprotected session.
    pub password: Option<String>,
    /// Per-address passwords, consulted by the answering side once the
    /// remote `ADR` is known. Overrides `password` on a match.
    pub node_passwords: Vec<(String, String)>,
    /// `SYS` banner line.
    pub system_name: String,
    /// `ZYZ` banner line.
    pub sysop: String,
    /// `LOC` banner line.
    pub location: String,
    /// Advertise `OPT CRC`.
    pub crc: bool,
    /// Offer (answering) or answer (originating) a CRAM-MD5 challenge
    /// instead of sending the password in the clear.
    pub cram_md5: bool,
    /// Data frame size used when sending.
    pub chunk_size: usize,
    /// Deadline for the whole handshake.
    pub handshake_timeout: Duration,
    /// Deadline for the remote to say anything once established.
    pub idle_timeout: Duration,
    /// Deadline for writing a command frame.
    pub command_timeout: Duration,
    /// Deadline for writing a data frame.
    pub data_timeout: Duration,
}

impl SessionConfig {
    /// Defaults for `side`.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            local_addresses: Vec::new(),
            expected_addresses: Vec::new(),
            password: None,
            node_passwords: Vec::new(),
            system_name: String::new(),
            sysop: String::new(),
            location: String::new(),
            crc: false,
            cram_md5: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            idle_timeout: IDLE_TIMEOUT,
            command_timeout: COMMAND_SEND_TIMEOUT,
            data_timeout: DATA_SEND_TIMEOUT,
        }
    }

    /// Start building a configuration for `side`.
    pub fn builder(side: Side) -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self::new(side),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("side", &self.side)
            .field("local_addresses", &self.local_addresses)
            .field("expected_addresses", &self.expected_addresses)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("node_passwords", &self.node_passwords.len())
            .field("system_name", &self.system_name)
            .field("crc", &self.crc)
            .field("cram_md5", &self.cram_md5)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

/// Normalize a configured password; `-` and the empty string mean none.
pub fn normalize_password(password: &str) -> Option<String> {
    let password = password.trim();
    if password.is_empty() || password == EMPTY_PASSWORD {
        None
    } else {
        Some(password.to_string())
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Add an address to our `ADR`.
    pub fn local_address(mut self, address: impl Into<String>) -> Self {
        self.config.local_addresses.push(address.into());
        self
    }

    /// Accept a remote address.
    pub fn expected_address(mut self, address: impl Into<String>) -> Self {
        self.config.expected_addresses.push(address.into());
        self
    }

    /// Set the session password; `-` clears it.
    pub fn password(mut self, password: &str) -> Self {
        self.config.password = normalize_password(password);
        self
    }

    /// Password for one remote address (answering side).
    pub fn node_password(mut self, address: impl Into<String>, password: &str) -> Self {
        if let Some(password) = normalize_password(password) {
            self.config.node_passwords.push((address.into(), password));
        }
        self
    }

    /// Set the `SYS` line.
    pub fn system_name(mut self, name: impl Into<String>) -> Self {
        self.config.system_name = name.into();
        self
    }

    /// Set the `ZYZ` line.
    pub fn sysop(mut self, sysop: impl Into<String>) -> Self {
        self.config.sysop = sysop.into();
        self
    }

    /// Set the `LOC` line.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.config.location = location.into();
        self
    }

    /// Enable or disable `OPT CRC`.
    pub fn crc(mut self, enabled: bool) -> Self {
        self.config.crc = enabled;
        self
    }

    /// Enable or disable the CRAM-MD5 exchange.
    pub fn cram_md5(mut self, enabled: bool) -> Self {
        self.config.cram_md5 = enabled;
        self
    }

    /// Set the data frame size, clamped to 1..=32767.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size.clamp(1, MAX_PAYLOAD_SIZE);
        self
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set the command write timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the data write timeout.
    pub fn data_timeout(mut self, timeout: Duration) -> Self {
        self.config.data_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
