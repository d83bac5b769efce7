//! Parsing and formatting of command arguments.
//!
//! ```text
//! FILE  name size modified_at offset [crc32]
//! GOT   name size modified_at
//! SKIP  name size modified_at
//! GET   name size modified_at offset     (or: name offset)
//! ADR   addr addr ...
//! ```
//!
//! File names stay raw bytes so that GOT, SKIP and GET echo exactly what the
//! peer announced.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Whitespace separated fields of an argument.
fn fields(argument: &[u8]) -> impl Iterator<Item = &[u8]> {
    argument
        .split(u8::is_ascii_whitespace)
        .filter(|field| !field.is_empty())
}

fn number<T: FromStr>(field: &[u8]) -> Option<T> {
    std::str::from_utf8(field).ok()?.parse().ok()
}

fn line(name: &[u8], rest: String) -> Vec<u8> {
    let mut line = Vec::with_capacity(name.len() + rest.len());
    line.extend_from_slice(name);
    line.extend_from_slice(rest.as_bytes());
    line
}

/// A file description as carried by FILE, GOT and SKIP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// File name as sent on the wire; never contains whitespace.
    pub name: Vec<u8>,
    /// Total size in bytes.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub modified_at: i64,
    /// Offset the data frames that follow start at.
    pub offset: u64,
    /// CRC-32 of the whole file, present when both sides negotiated `OPT CRC`.
    pub crc: Option<u32>,
}

impl FileInfo {
    /// Describe a file sent from the start, without CRC.
    pub fn new(name: impl Into<Vec<u8>>, size: u64, modified_at: i64) -> Self {
        Self {
            name: name.into(),
            size,
            modified_at,
            offset: 0,
            crc: None,
        }
    }

    /// Parse a FILE argument. The offset defaults to 0 when absent.
    pub fn parse(argument: &[u8]) -> Option<Self> {
        let mut fields = fields(argument);
        let name = fields.next()?.to_vec();
        let size = number(fields.next()?)?;
        let modified_at = number(fields.next()?)?;
        let offset = match fields.next() {
            Some(field) => number(field)?,
            None => 0,
        };
        let crc = match fields.next() {
            Some(field) => Some(u32::from_str_radix(std::str::from_utf8(field).ok()?, 16).ok()?),
            None => None,
        };
        Some(Self {
            name,
            size,
            modified_at,
            offset,
            crc,
        })
    }

    /// Name as text, for logs and sinks.
    pub fn display_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// Name as a queue key, if it is valid UTF-8.
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    /// Argument for a FILE command.
    pub fn file_line(&self) -> Vec<u8> {
        let rest = match self.crc {
            Some(crc) => format!(
                " {} {} {} {:08X}",
                self.size, self.modified_at, self.offset, crc
            ),
            None => format!(" {} {} {}", self.size, self.modified_at, self.offset),
        };
        line(&self.name, rest)
    }

    /// Argument for a GOT or SKIP command.
    pub fn ack_line(&self) -> Vec<u8> {
        line(&self.name, format!(" {} {}", self.size, self.modified_at))
    }
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.file_line()))
    }
}

/// A GET request: resend `name` starting at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    /// Name of the requested file, as sent on the wire.
    pub name: Vec<u8>,
    /// Offset to resume from.
    pub offset: u64,
    /// Size, when the long form was used.
    pub size: Option<u64>,
    /// Modification time, when the long form was used.
    pub modified_at: Option<i64>,
}

impl GetRequest {
    /// Parse `name offset` or `name size modified_at offset`.
    pub fn parse(argument: &[u8]) -> Option<Self> {
        let fields: Vec<&[u8]> = fields(argument).collect();
        match fields.as_slice() {
            [name, offset] => Some(Self {
                name: name.to_vec(),
                offset: number(offset)?,
                size: None,
                modified_at: None,
            }),
            [name, size, modified_at, offset, ..] => Some(Self {
                name: name.to_vec(),
                offset: number(offset)?,
                size: Some(number(size)?),
                modified_at: Some(number(modified_at)?),
            }),
            _ => None,
        }
    }

    /// Long form request for the file described by `info`.
    pub fn for_file(info: &FileInfo, offset: u64) -> Self {
        Self {
            name: info.name.clone(),
            offset,
            size: Some(info.size),
            modified_at: Some(info.modified_at),
        }
    }

    /// Name as a queue key, if it is valid UTF-8.
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    /// Argument for a GET command.
    pub fn line(&self) -> Vec<u8> {
        let rest = match (self.size, self.modified_at) {
            (Some(size), Some(modified_at)) => format!(" {} {} {}", size, modified_at, self.offset),
            _ => format!(" {}", self.offset),
        };
        line(&self.name, rest)
    }
}

/// Name field of a GOT or SKIP argument.
pub fn ack_name(argument: &[u8]) -> Option<&[u8]> {
    fields(argument).next()
}

/// Split an ADR argument into addresses.
pub fn split_addresses(argument: &str) -> Vec<String> {
    argument.split_whitespace().map(str::to_string).collect()
}

/// Split a NUL line into its keyword and the rest (`"SYS My BBS"`).
pub fn split_info(argument: &str) -> (&str, &str) {
    let argument = argument.trim();
    match argument.split_once(' ') {
        Some((key, value)) => (key, value.trim()),
        None => (argument, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_line_roundtrip() {
        let info = FileInfo::new("hello.txt", 12, 1_700_000_000);
        assert_eq!(info.file_line(), b"hello.txt 12 1700000000 0");
        assert_eq!(FileInfo::parse(&info.file_line()), Some(info));
    }

    #[test]
    fn test_file_line_with_crc() {
        let info = FileInfo {
            offset: 5,
            crc: Some(0x0A1B_2C3D),
            ..FileInfo::new("a.pkt", 100, 7)
        };
        assert_eq!(info.file_line(), b"a.pkt 100 7 5 0A1B2C3D");
        assert_eq!(FileInfo::parse(b"a.pkt 100 7 5 0a1b2c3d"), Some(info));
    }

    #[test]
    fn test_file_line_without_offset() {
        let info = FileInfo::parse(b"x 1 2").unwrap();
        assert_eq!(info.offset, 0);
        assert_eq!(info.crc, None);
    }

    #[test]
    fn test_file_line_malformed() {
        assert_eq!(FileInfo::parse(b""), None);
        assert_eq!(FileInfo::parse(b"name"), None);
        assert_eq!(FileInfo::parse(b"name big 2 0"), None);
        assert_eq!(FileInfo::parse(b"name 1 2 -1"), None);
        assert_eq!(FileInfo::parse(b"name 1 2 0 nothex"), None);
    }

    #[test]
    fn test_non_utf8_name_is_echoed() {
        let info = FileInfo::parse(b"\xE9t\xE9.pkt 4 99 0").unwrap();
        assert_eq!(info.name, b"\xE9t\xE9.pkt");
        assert_eq!(info.name_str(), None);
        assert_eq!(info.display_name(), "\u{FFFD}t\u{FFFD}.pkt");
        assert_eq!(info.ack_line(), b"\xE9t\xE9.pkt 4 99");
        assert_eq!(ack_name(&info.ack_line()), Some(&b"\xE9t\xE9.pkt"[..]));
        assert_eq!(GetRequest::for_file(&info, 0).line(), b"\xE9t\xE9.pkt 4 99 0");
    }

    #[test]
    fn test_ack_line() {
        let info = FileInfo::parse(b"hello.txt 12 99 0").unwrap();
        assert_eq!(info.ack_line(), b"hello.txt 12 99");
        assert_eq!(ack_name(&info.ack_line()), Some(&b"hello.txt"[..]));
        assert_eq!(ack_name(b"  "), None);
    }

    #[test]
    fn test_get_short_and_long_forms() {
        let get = GetRequest::parse(b"name 5").unwrap();
        assert_eq!(get.offset, 5);
        assert_eq!(get.size, None);
        assert_eq!(get.name_str(), Some("name"));
        assert_eq!(get.line(), b"name 5");

        let get = GetRequest::parse(b"name 12 99 5").unwrap();
        assert_eq!(get.offset, 5);
        assert_eq!(get.size, Some(12));
        assert_eq!(get.modified_at, Some(99));
        assert_eq!(get.line(), b"name 12 99 5");

        assert_eq!(GetRequest::parse(b"name"), None);
        assert_eq!(GetRequest::parse(b"name 12 99"), None);
        assert_eq!(GetRequest::parse(b"name x"), None);
    }

    #[test]
    fn test_get_for_file() {
        let info = FileInfo::new("f", 10, 3);
        assert_eq!(GetRequest::for_file(&info, 0).line(), b"f 10 3 0");
    }

    #[test]
    fn test_split_addresses() {
        assert_eq!(
            split_addresses(" 1:2/3  20000:20000/1@wwivnet "),
            vec!["1:2/3".to_string(), "20000:20000/1@wwivnet".to_string()]
        );
        assert!(split_addresses("").is_empty());
    }

    #[test]
    fn test_split_info() {
        assert_eq!(split_info("SYS My BBS"), ("SYS", "My BBS"));
        assert_eq!(split_info("OPT CRC"), ("OPT", "CRC"));
        assert_eq!(split_info("TIME"), ("TIME", ""));
    }
}
