//! Session states and roles.

use std::fmt;

/// Handshake and transfer states. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, nothing exchanged yet.
    Init,
    /// Transport available; sending banner and addresses.
    WaitConnect,
    /// Sending our password (originating side only).
    SendPassword,
    /// Waiting for the remote `ADR`.
    WaitAddress,
    /// Checking the remote addresses and password.
    AuthenticateRemote,
    /// Remote accepted; confirming with `OK` (answering side only).
    SecureCheck,
    /// Waiting for the remote `OK` (originating side only).
    WaitOk,
    /// Exchanging files.
    Established,
    /// Done. Absorbing.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "Init",
            SessionState::WaitConnect => "WaitConnect",
            SessionState::SendPassword => "SendPassword",
            SessionState::WaitAddress => "WaitAddress",
            SessionState::AuthenticateRemote => "AuthenticateRemote",
            SessionState::SecureCheck => "SecureCheck",
            SessionState::WaitOk => "WaitOk",
            SessionState::Established => "Established",
            SessionState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Which end of the connection this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// We placed the call; we send `PWD` and wait for `OK`.
    Originating,
    /// We accepted the call; we check `PWD` and send `OK`.
    Answering,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Originating => f.write_str("originating"),
            Side::Answering => f.write_str("answering"),
        }
    }
}
