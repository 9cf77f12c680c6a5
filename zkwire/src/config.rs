//! Client configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zkwire_core::{
    constants::{DEFAULT_PORT, MAX_CHUNK_TCP, MAX_CHUNK_UDP, MAX_RETRIES},
    TransportKind,
};
use zkwire_types::UserLayout;

use crate::error::{Error, Result};

/// Connection settings for one terminal
///
/// Every field except `address` has a default, so a minimal TOML file is:
///
/// ```toml
/// address = "192.168.1.201"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub address: String,

    /// Device port (default: 4370)
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub transport: TransportKind,

    /// CommKey password, 0 when the device has none
    #[serde(default)]
    pub password: u32,

    /// Reply and TCP connect timeout in milliseconds (default: 5000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// UDP retransmissions before the session is declared lost (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Skip the reachability probe before connecting
    #[serde(default)]
    pub omit_ping: bool,

    /// Bytes requested per CMD_READ_BUFFER; transport default when unset
    #[serde(default)]
    pub chunk_size: Option<u32>,

    #[serde(default)]
    pub user_layout: UserLayout,

    /// How often callers should run a heartbeat (default: 30)
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> usize {
    MAX_RETRIES
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

impl DeviceConfig {
    pub fn new(address: impl Into<String>, port: u16, transport: TransportKind) -> Self {
        Self {
            address: address.into(),
            port,
            transport,
            password: 0,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            omit_ping: false,
            chunk_size: None,
            user_layout: UserLayout::default(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::Config("Device address cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("Device port must be greater than 0".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("Timeout must be greater than 0".to_string()));
        }
        if let Some(size) = self.chunk_size {
            if size == 0 || size > MAX_CHUNK_TCP {
                return Err(Error::Config(format!(
                    "Chunk size must be between 1 and {MAX_CHUNK_TCP} bytes"
                )));
            }
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(Error::Config(
                "Heartbeat interval must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Chunk size in effect for the configured transport
    pub fn effective_chunk_size(&self) -> u32 {
        self.chunk_size.unwrap_or(match self.transport {
            TransportKind::Tcp => MAX_CHUNK_TCP,
            TransportKind::Udp => MAX_CHUNK_UDP,
        })
    }
}
