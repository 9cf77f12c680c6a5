//! Simulator configuration
//!
//! Everything has a default, so an empty TOML document describes a
//! password-less TCP terminal on port 4370.

use std::path::Path;

use serde::{Deserialize, Serialize};
use zkwire_core::{
    constants::{DATA_FRAME_SIZE, DEFAULT_PORT},
    TransportKind,
};
use zkwire_types::UserLayout;

use crate::error::{Error, Result};

/// Listener and protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Address to listen on (default: 0.0.0.0)
    #[serde(default = "default_ip")]
    pub ip: String,

    /// Port to listen on, 0 for an ephemeral port (default: 4370)
    #[serde(default = "default_port")]
    pub port: u16,

    /// CommKey password, 0 disables authentication
    #[serde(default)]
    pub password: u32,

    #[serde(default)]
    pub transport: TransportKind,

    /// Largest data set answered inline to CMD_PREPARE_BUFFER
    #[serde(default = "default_inline_limit")]
    pub inline_limit: usize,

    /// Payload size of the DATA frames a chunk is streamed in
    #[serde(default = "default_data_frame_size")]
    pub data_frame_size: usize,

    /// Silence after which a TCP session is dropped (default: 300)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default)]
    pub profile: DeviceProfile,
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_inline_limit() -> usize {
    1024
}

fn default_data_frame_size() -> usize {
    DATA_FRAME_SIZE
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
            password: 0,
            transport: TransportKind::Tcp,
            inline_limit: default_inline_limit(),
            data_frame_size: default_data_frame_size(),
            idle_timeout_secs: default_idle_timeout_secs(),
            profile: DeviceProfile::default(),
        }
    }
}

impl SimulatorConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
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

    pub fn validate(&self) -> Result<()> {
        if self.ip.trim().is_empty() {
            return Err(Error::Config("Listen address cannot be empty".to_string()));
        }
        if self.data_frame_size == 0 {
            return Err(Error::Config("Data frame size must be greater than 0".to_string()));
        }
        if self.idle_timeout_secs == 0 {
            return Err(Error::Config("Idle timeout must be at least 1 second".to_string()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Identity and limits the simulated terminal reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    pub firmware_version: String,
    pub serial_number: String,
    pub platform: String,
    pub device_name: String,
    pub mac_address: String,
    pub netmask: String,
    pub gateway: String,
    pub pin_width: u8,
    /// Layout of user records in data sets
    pub user_layout: UserLayout,
    pub users_cap: i32,
    pub fingers_cap: i32,
    pub records_cap: i32,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            firmware_version: "Ver 6.60 Nov 13 2019".to_string(),
            serial_number: "DGD9190019050335743".to_string(),
            platform: "ZEM560".to_string(),
            device_name: "ZKTeco Device".to_string(),
            mac_address: "00:17:61:C8:EC:17".to_string(),
            netmask: "255.255.255.0".to_string(),
            gateway: "192.168.1.1".to_string(),
            pin_width: 5,
            user_layout: UserLayout::Extended,
            users_cap: 3000,
            fingers_cap: 10000,
            records_cap: 100000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(SimulatorConfig::from_toml_str("").unwrap(), SimulatorConfig::default());
    }

    #[test]
    fn test_profile_overrides() {
        let config = SimulatorConfig::from_toml_str(
            r#"
            port = 0
            password = 1234
            transport = "udp"

            [profile]
            serial_number = "SIM0001"
            user_layout = "compact"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 0);
        assert_eq!(config.transport, TransportKind::Udp);
        assert_eq!(config.profile.serial_number, "SIM0001");
        assert_eq!(config.profile.user_layout, UserLayout::Compact);
        assert_eq!(config.profile.platform, "ZEM560");
    }

    #[test]
    fn test_validation() {
        assert!(SimulatorConfig::from_toml_str("data_frame_size = 0").is_err());
        assert!(SimulatorConfig::from_toml_str("ip = \"\"").is_err());
    }
}
