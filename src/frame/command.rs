//! binkp command identifiers.

use std::borrow::Cow;
use std::fmt;

/// Command identifiers carried in byte 0 of a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    /// Informational line (`SYS`, `ZYZ`, `LOC`, `VER`, `OPT`, ...).
    Nul = 0,
    /// Space separated list of the sender's addresses.
    Adr = 1,
    /// Session password.
    Pwd = 2,
    /// File announcement: `name size modified_at offset`.
    File = 3,
    /// Password accepted.
    Ok = 4,
    /// End of batch: nothing more to send.
    Eob = 5,
    /// File received: `name size modified_at`.
    Got = 6,
    /// Fatal error, the sender is about to hang up.
    Err = 7,
    /// Non-fatal refusal, try again later.
    Bsy = 8,
    /// Resend a file from an offset.
    Get = 9,
    /// Refuse a file for now; the sender keeps it.
    Skip = 10,
}

impl CommandId {
    /// Parse a command id from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Nul),
            1 => Some(Self::Adr),
            2 => Some(Self::Pwd),
            3 => Some(Self::File),
            4 => Some(Self::Ok),
            5 => Some(Self::Eob),
            6 => Some(Self::Got),
            7 => Some(Self::Err),
            8 => Some(Self::Bsy),
            9 => Some(Self::Get),
            10 => Some(Self::Skip),
            _ => None,
        }
    }

    /// Convert the command id to its byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Protocol name, as used in logs (`M_FILE`).
    pub fn name(self) -> &'static str {
        match self {
            Self::Nul => "M_NUL",
            Self::Adr => "M_ADR",
            Self::Pwd => "M_PWD",
            Self::File => "M_FILE",
            Self::Ok => "M_OK",
            Self::Eob => "M_EOB",
            Self::Got => "M_GOT",
            Self::Err => "M_ERR",
            Self::Bsy => "M_BSY",
            Self::Get => "M_GET",
            Self::Skip => "M_SKIP",
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A command: id plus argument bytes.
///
/// Arguments are kept exactly as they came off the wire. Names from older
/// systems are often not UTF-8, and acknowledgements have to echo them byte
/// for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command identifier.
    pub id: CommandId,
    /// Argument, not NUL terminated on the wire.
    pub argument: Vec<u8>,
}

impl Command {
    /// Create a new command.
    pub fn new(id: CommandId, argument: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            argument: argument.into(),
        }
    }

    /// Argument as text; invalid UTF-8 is replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.argument)
    }

    /// Argument as it may appear in logs; passwords are masked.
    pub fn loggable_argument(&self) -> Cow<'_, str> {
        if self.id == CommandId::Pwd {
            Cow::Borrowed("********")
        } else {
            self.text()
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.loggable_argument())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_roundtrip() {
        for byte in 0..=10u8 {
            let id = CommandId::from_byte(byte).unwrap();
            assert_eq!(id.as_byte(), byte);
        }
        assert_eq!(CommandId::from_byte(11), None);
        assert_eq!(CommandId::from_byte(0xFF), None);
    }

    #[test]
    fn test_password_is_masked() {
        let cmd = Command::new(CommandId::Pwd, "secret");
        assert_eq!(cmd.to_string(), "M_PWD: ********");

        let cmd = Command::new(CommandId::Adr, "2:280/464@fidonet");
        assert_eq!(cmd.to_string(), "M_ADR: 2:280/464@fidonet");
    }

    #[test]
    fn test_argument_keeps_raw_bytes() {
        let cmd = Command::new(CommandId::Got, &b"\xE9t\xE9.pkt 4 0"[..]);
        assert_eq!(cmd.argument, b"\xE9t\xE9.pkt 4 0");
        assert_eq!(cmd.text(), "\u{FFFD}t\u{FFFD}.pkt 4 0");
    }
}
