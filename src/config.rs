//! # Configuration
//!
//! Node identity, binkp settings and the list of nodes we call, loaded from
//! TOML.
//!
//! ```toml
//! [node]
//! system_name = "My BBS"
//! sysop = "Sysop"
//! location = "Somewhere"
//! addresses = ["1:234/5@fidonet"]
//!
//! [binkp]
//! port = 24554
//! inbound_dir = "spool/inbound"
//! outbound_dir = "spool/outbound"
//!
//! [[callouts]]
//! address = "1:234/6@fidonet"
//! host = "bbs.example.org"
//! password = "secret"
//! ```
//!
//! Every `[binkp]` key has a default; `[node]` needs at least one address.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::core::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT, MAX_PAYLOAD_SIZE};
use crate::session::{SessionConfig, Side, address_matches};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("cannot access config file {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`BinkConfig`].
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// Serializing the configuration failed.
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range or missing.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// No callout entry for an address.
    #[error("no callout configured for {0}")]
    UnknownNode(String),
}

/// Our node identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// `SYS` banner line.
    #[serde(default)]
    pub system_name: String,
    /// `ZYZ` banner line.
    #[serde(default)]
    pub sysop: String,
    /// `LOC` banner line.
    #[serde(default)]
    pub location: String,
    /// Addresses presented in `ADR`.
    pub addresses: Vec<String>,
}

/// Protocol and spool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinkpConfig {
    /// Listen address for the answering server.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Data frame size when sending.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Advertise `OPT CRC`.
    #[serde(default = "default_true")]
    pub crc: bool,
    /// Use the CRAM-MD5 password exchange when the remote supports it.
    #[serde(default = "default_true")]
    pub cram_md5: bool,
    /// Answer nodes that have no callout entry (without a password).
    #[serde(default = "default_true")]
    pub accept_unknown: bool,
    /// Concurrent inbound sessions; further callers get `BSY`.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Handshake timeout, seconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,
    /// Idle timeout once established, seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    /// Outbound connect timeout, seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Where received files are written.
    #[serde(default = "default_inbound_dir")]
    pub inbound_dir: PathBuf,
    /// Root of the per-node outbound spools.
    #[serde(default = "default_outbound_dir")]
    pub outbound_dir: PathBuf,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

fn default_max_sessions() -> usize {
    8
}

fn default_handshake_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_inbound_dir() -> PathBuf {
    PathBuf::from("spool/inbound")
}

fn default_outbound_dir() -> PathBuf {
    PathBuf::from("spool/outbound")
}

impl Default for BinkpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            chunk_size: default_chunk_size(),
            crc: true,
            cram_md5: true,
            accept_unknown: true,
            max_sessions: default_max_sessions(),
            handshake_timeout: default_handshake_timeout(),
            idle_timeout: default_idle_timeout(),
            connect_timeout: default_connect_timeout(),
            inbound_dir: default_inbound_dir(),
            outbound_dir: default_outbound_dir(),
        }
    }
}

impl BinkpConfig {
    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// A node we call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Callout {
    /// Remote node address.
    pub address: String,
    /// Host name or IP.
    pub host: String,
    /// Port; defaults to 24554.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Session password; absent or `-` for none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Callout {
    /// Port to connect to.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinkConfig {
    /// `[node]` section.
    pub node: NodeConfig,
    /// `[binkp]` section.
    #[serde(default)]
    pub binkp: BinkpConfig,
    /// `[[callouts]]` entries.
    #[serde(default)]
    pub callouts: Vec<Callout>,
}

impl BinkConfig {
    /// Load and validate a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BinkConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration from a string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BinkConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write an example configuration file.
    pub async fn create_default(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let mut config = BinkConfig::default();
        config.node.system_name = "My BBS".to_string();
        config.node.addresses = vec!["1:1/1@fidonet".to_string()];
        fs::write(path, config.to_toml_string()?)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.addresses.is_empty() {
            return Err(ConfigError::Invalid("node.addresses is empty".into()));
        }
        if self.node.addresses.iter().any(|a| a.contains(char::is_whitespace)) {
            return Err(ConfigError::Invalid("node addresses cannot contain spaces".into()));
        }
        if self.binkp.chunk_size == 0 || self.binkp.chunk_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::Invalid(format!(
                "binkp.chunk_size must be within 1..={}",
                MAX_PAYLOAD_SIZE
            )));
        }
        if self.binkp.max_sessions == 0 {
            return Err(ConfigError::Invalid("binkp.max_sessions must be at least 1".into()));
        }
        if self.binkp.handshake_timeout == 0
            || self.binkp.idle_timeout == 0
            || self.binkp.connect_timeout == 0
        {
            return Err(ConfigError::Invalid("timeouts must be at least one second".into()));
        }
        for (i, callout) in self.callouts.iter().enumerate() {
            if callout.host.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "callout {} has no host",
                    callout.address
                )));
            }
            if self.callouts[..i]
                .iter()
                .any(|c| address_matches(&c.address, &callout.address))
            {
                return Err(ConfigError::Invalid(format!(
                    "duplicate callout {}",
                    callout.address
                )));
            }
        }
        Ok(())
    }

    /// Callout entry for `address`.
    pub fn callout(&self, address: &str) -> Option<&Callout> {
        self.callouts
            .iter()
            .find(|c| address_matches(&c.address, address))
    }

    fn base_session(&self, side: Side) -> crate::session::SessionConfigBuilder {
        let mut builder = SessionConfig::builder(side)
            .system_name(&self.node.system_name)
            .sysop(&self.node.sysop)
            .location(&self.node.location)
            .crc(self.binkp.crc)
            .cram_md5(self.binkp.cram_md5)
            .chunk_size(self.binkp.chunk_size)
            .handshake_timeout(Duration::from_secs(self.binkp.handshake_timeout))
            .idle_timeout(Duration::from_secs(self.binkp.idle_timeout));
        for address in &self.node.addresses {
            builder = builder.local_address(address);
        }
        builder
    }

    /// Session settings for calling `address`.
    pub fn session_for_callout(&self, address: &str) -> Result<SessionConfig, ConfigError> {
        let callout = self
            .callout(address)
            .ok_or_else(|| ConfigError::UnknownNode(address.to_string()))?;
        let mut builder = self
            .base_session(Side::Originating)
            .expected_address(&callout.address);
        if let Some(password) = &callout.password {
            builder = builder.password(password);
        }
        Ok(builder.build())
    }

    /// Session settings for inbound calls.
    pub fn answering_session(&self) -> SessionConfig {
        let mut builder = self.base_session(Side::Answering);
        for callout in &self.callouts {
            if !self.binkp.accept_unknown {
                builder = builder.expected_address(&callout.address);
            }
            if let Some(password) = &callout.password {
                builder = builder.node_password(&callout.address, password);
            }
        }
        builder.build()
    }

    /// Outbound spool directory for `address`.
    ///
    /// Named after the callout entry's address when there is one, so that
    /// `1:1/2` and `1:1/2@fidonet` share a spool.
    pub fn outbound_spool(&self, address: &str) -> PathBuf {
        let address = self.callout(address).map_or(address, |c| c.address.as_str());
        self.binkp.outbound_dir.join(spool_dir_name(address))
    }
}

/// Directory name for a node address (`1:2/3@net` -> `1_2_3_net`).
pub fn spool_dir_name(address: &str) -> String {
    address
        .chars()
        .map(|c| if matches!(c, ':' | '/' | '@') { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[node]
system_name = "Test BBS"
sysop = "Sysop"
location = "Earth"
addresses = ["1:1/1@fidonet"]

[binkp]
port = 24555
chunk_size = 4096
inbound_dir = "in"

[[callouts]]
address = "1:1/2@fidonet"
host = "bbs.example.org"
password = "secret"

[[callouts]]
address = "1:1/3"
host = "10.0.0.3"
port = 2000
password = "-"
"#;

    #[test]
    fn test_parse_sample() {
        let config = BinkConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.node.system_name, "Test BBS");
        assert_eq!(config.binkp.port, 24555);
        assert_eq!(config.binkp.chunk_size, 4096);
        assert!(config.binkp.crc);
        assert!(config.binkp.cram_md5);
        assert_eq!(config.binkp.outbound_dir, PathBuf::from("spool/outbound"));
        assert_eq!(config.callouts.len(), 2);
        assert_eq!(config.callouts[0].port(), DEFAULT_PORT);
        assert_eq!(config.callouts[1].port(), 2000);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BinkConfig::from_toml_str("[node]\naddresses = [\"1:1/1\"]\n").unwrap();
        assert_eq!(config.binkp.port, DEFAULT_PORT);
        assert_eq!(config.binkp.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.callouts.is_empty());
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            BinkConfig::from_toml_str("[node]\naddresses = []\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BinkConfig::from_toml_str("[node]\naddresses = [\"1:1/1\"]\n[binkp]\nchunk_size = 40000\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BinkConfig::from_toml_str("[node]\naddresses = \"oops\"\n"),
            Err(ConfigError::Parse { .. })
        ));

        let duplicate = format!(
            "{}\n[[callouts]]\naddress = \"1:1/2\"\nhost = \"other\"\n",
            SAMPLE
        );
        assert!(matches!(
            BinkConfig::from_toml_str(&duplicate),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_session_for_callout() {
        let config = BinkConfig::from_toml_str(SAMPLE).unwrap();

        let session = config.session_for_callout("1:1/2").unwrap();
        assert_eq!(session.side, Side::Originating);
        assert_eq!(session.password.as_deref(), Some("secret"));
        assert_eq!(session.local_addresses, vec!["1:1/1@fidonet"]);
        assert_eq!(session.chunk_size, 4096);
        assert!(session.cram_md5);

        let session = config.session_for_callout("1:1/3").unwrap();
        assert_eq!(session.password, None);

        assert!(matches!(
            config.session_for_callout("9:9/9"),
            Err(ConfigError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_answering_session() {
        let config = BinkConfig::from_toml_str(SAMPLE).unwrap();
        let session = config.answering_session();
        assert_eq!(session.side, Side::Answering);
        assert!(session.expected_addresses.is_empty());
        assert_eq!(session.password, None);
        assert_eq!(
            session.node_passwords,
            vec![("1:1/2@fidonet".to_string(), "secret".to_string())]
        );

        let mut strict = config.clone();
        strict.binkp.accept_unknown = false;
        assert_eq!(strict.answering_session().expected_addresses.len(), 2);
    }

    #[test]
    fn test_spool_dir_name() {
        assert_eq!(spool_dir_name("1:2/3@fidonet"), "1_2_3_fidonet");
        let config = BinkConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(
            config.outbound_spool("1:1/2"),
            PathBuf::from("spool/outbound/1_1_2_fidonet")
        );
        assert_eq!(
            config.outbound_spool("1:1/2@fidonet"),
            config.outbound_spool("1:1/2")
        );
        assert_eq!(
            config.outbound_spool("9:9/9"),
            PathBuf::from("spool/outbound/9_9_9")
        );
    }

    #[test]
    fn test_cram_can_be_turned_off() {
        let config = BinkConfig::from_toml_str(
            "[node]\naddresses = [\"1:1/1\"]\n[binkp]\ncram_md5 = false\n",
        )
        .unwrap();
        assert!(!config.answering_session().cram_md5);
    }

    #[tokio::test]
    async fn test_load_and_create_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binkp.toml");
        BinkConfig::create_default(&path).await.unwrap();
        let config = BinkConfig::load(&path).await.unwrap();
        assert_eq!(config.node.addresses, vec!["1:1/1@fidonet"]);

        let missing = BinkConfig::load(dir.path().join("missing.toml")).await;
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
