//! What we learn about the remote node during the handshake.

use super::cram::Challenge;
use crate::frame::args::split_info;

/// Remote node details gathered from `ADR` and `NUL` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteNode {
    /// Addresses from the remote `ADR`.
    pub addresses: Vec<String>,
    /// `SYS` line.
    pub system_name: Option<String>,
    /// `ZYZ` line.
    pub sysop: Option<String>,
    /// `LOC` line.
    pub location: Option<String>,
    /// `VER` line.
    pub version: Option<String>,
    /// Tokens from `OPT` lines.
    pub options: Vec<String>,
    /// Any other `NUL` line, verbatim.
    pub other: Vec<String>,
}

impl RemoteNode {
    /// Record one `NUL` line.
    pub fn record_info(&mut self, line: &str) {
        let (key, value) = split_info(line);
        match key {
            "SYS" => self.system_name = Some(value.to_string()),
            "ZYZ" => self.sysop = Some(value.to_string()),
            "LOC" => self.location = Some(value.to_string()),
            "VER" => self.version = Some(value.to_string()),
            "OPT" => self
                .options
                .extend(value.split_whitespace().map(str::to_string)),
            _ => self.other.push(line.to_string()),
        }
    }

    /// Check if the remote advertised an `OPT` token.
    pub fn supports(&self, option: &str) -> bool {
        self.options.iter().any(|o| o.eq_ignore_ascii_case(option))
    }

    /// CRAM-MD5 challenge offered in an `OPT` line, if any.
    pub fn cram_challenge(&self) -> Option<Challenge> {
        self.options.iter().find_map(|o| Challenge::from_option(o))
    }

    /// First remote address, for logs.
    pub fn primary_address(&self) -> &str {
        self.addresses.first().map(String::as_str).unwrap_or("unknown")
    }
}

/// Compare two node addresses, ignoring a `@domain` suffix and case.
pub fn address_matches(a: &str, b: &str) -> bool {
    fn node(address: &str) -> &str {
        address.split('@').next().unwrap_or(address)
    }
    node(a).eq_ignore_ascii_case(node(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_info() {
        let mut remote = RemoteNode::default();
        remote.record_info("SYS Remote BBS");
        remote.record_info("ZYZ Sysop Name");
        remote.record_info("VER binkd/1.1 binkp/1.1");
        remote.record_info("OPT NR CRC");
        remote.record_info("TIME Tue, 01 Jan 2030");

        assert_eq!(remote.system_name.as_deref(), Some("Remote BBS"));
        assert_eq!(remote.sysop.as_deref(), Some("Sysop Name"));
        assert_eq!(remote.version.as_deref(), Some("binkd/1.1 binkp/1.1"));
        assert!(remote.supports("CRC"));
        assert!(remote.supports("nr"));
        assert!(!remote.supports("MB"));
        assert_eq!(remote.other, vec!["TIME Tue, 01 Jan 2030"]);
        assert_eq!(remote.cram_challenge(), None);
    }

    #[test]
    fn test_cram_challenge_from_opt() {
        let mut remote = RemoteNode::default();
        remote.record_info("OPT NR CRAM-MD5-0a0b0c CRC");
        assert_eq!(
            remote.cram_challenge(),
            Some(Challenge::from_bytes(vec![0x0a, 0x0b, 0x0c]))
        );
    }

    #[test]
    fn test_address_matches() {
        assert!(address_matches("1:2/3", "1:2/3"));
        assert!(address_matches("1:2/3@fidonet", "1:2/3"));
        assert!(address_matches("20000:20000/1@WWIVnet", "20000:20000/1@wwivnet"));
        assert!(!address_matches("1:2/3", "1:2/4"));
    }

    #[test]
    fn test_primary_address() {
        let mut remote = RemoteNode::default();
        assert_eq!(remote.primary_address(), "unknown");
        remote.addresses = vec!["1:2/3".into(), "2:3/4".into()];
        assert_eq!(remote.primary_address(), "1:2/3");
    }
}
