//! Cellmesh configuration.
//!
//! The mesh is described by the list of relay-node addresses plus the
//! tunables of the reliability layer. Configuration is read from a TOML file;
//! a missing or malformed file never stops a process, the defaults are used
//! instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Host used by the default peer list
pub const DEFAULT_HOST: &str = "localhost";

/// Default relay-node ports
pub const DEFAULT_NODE_PORTS: [u16; 4] = [31010, 31011, 31012, 31013];

/// Un-acknowledged messages tolerated before the dispatcher switches to resending
pub const DEFAULT_ACK_PENDING_THRESHOLD: usize = 10;

/// Dispatcher poll interval in milliseconds
pub const DEFAULT_DISPATCH_POLL_INTERVAL_MS: u64 = 5_000;

/// Delay between cell connection attempts in milliseconds
pub const DEFAULT_CONNECTION_RETRY_DELAY_MS: u64 = 5_000;

/// Connection attempts a cell makes before giving up
pub const DEFAULT_CONNECTION_RETRY_ATTEMPTS: u32 = 10;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config: read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config: parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("config: invalid: {0}")]
    Invalid(&'static str),
}

/// Address of a relay node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Mesh configuration shared by nodes and cells
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Relay nodes forming the mesh; nodes also bind to the first free one
    pub peers: Vec<PeerAddress>,
    /// Pending-ack count that triggers a full resend
    pub ack_pending_threshold: usize,
    /// Dispatcher sleep between iterations
    pub dispatch_poll_interval_ms: u64,
    /// Sleep between failed cell connection attempts
    pub connection_retry_delay_ms: u64,
    /// Connection attempts before a cell gives up
    pub connection_retry_attempts: u32,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            peers: DEFAULT_NODE_PORTS
                .iter()
                .map(|&port| PeerAddress::new(DEFAULT_HOST, port))
                .collect(),
            ack_pending_threshold: DEFAULT_ACK_PENDING_THRESHOLD,
            dispatch_poll_interval_ms: DEFAULT_DISPATCH_POLL_INTERVAL_MS,
            connection_retry_delay_ms: DEFAULT_CONNECTION_RETRY_DELAY_MS,
            connection_retry_attempts: DEFAULT_CONNECTION_RETRY_ATTEMPTS,
        }
    }
}

impl MeshConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration, falling back to the defaults on any error
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::info!("no configuration file given, using defaults");
            return Self::default();
        };

        match Self::load(path) {
            Ok(config) => {
                tracing::info!("loaded configuration from {}", path.display());
                config
            }
            Err(err) => {
                tracing::warn!("{}; using default configuration", err);
                Self::default()
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peers.is_empty() {
            return Err(ConfigError::Invalid("peers must not be empty"));
        }
        if self.ack_pending_threshold == 0 {
            return Err(ConfigError::Invalid("ack_pending_threshold must be greater than 0"));
        }
        if self.connection_retry_attempts == 0 {
            return Err(ConfigError::Invalid("connection_retry_attempts must be greater than 0"));
        }
        Ok(())
    }

    /// Serialize configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    #[inline]
    pub fn dispatch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_poll_interval_ms)
    }

    #[inline]
    pub fn connection_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connection_retry_delay_ms)
    }

    pub fn node_ports(&self) -> Vec<u16> {
        self.peers.iter().map(|peer| peer.port).collect()
    }
}
