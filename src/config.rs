//! Node configuration loaded from a TOML file
//!
//! Credentials are referenced by environment-variable name and resolved at
//! runtime; the config file never carries secrets.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level node configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub mqtt: MqttSection,
    pub topics: TopicsSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
    #[serde(default)]
    pub transfer: TransferSection,
    #[serde(default)]
    pub probe: ProbeSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub actuator: ActuatorSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// Node identifier, also used as the MQTT client id ([a-zA-Z0-9._-]+)
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL with scheme and optional port (mqtt:// or mqtts://)
    pub broker_url: String,
    /// Environment variable holding the username
    pub username_env: Option<String>,
    /// Environment variable holding the password
    pub password_env: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Topic names are configuration; their roles are the contract
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicsSection {
    /// Environment telemetry, publish-only, QoS 0
    pub telemetry: String,
    /// Bulk transfer, publish-only, chunked
    pub transfer: String,
    /// Remote commands, subscribe-only
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySection {
    #[serde(default = "default_telemetry_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferSection {
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Backpressure pause between blocks, bounds memory pressure on the device
    #[serde(default = "default_inter_block_pause_ms")]
    pub inter_block_pause_ms: u64,
    #[serde(default = "default_transfer_interval_secs")]
    pub interval_secs: u64,
    /// Size of the synthetic frames published when no real source is wired up
    #[serde(default = "default_frame_len")]
    pub frame_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSection {
    /// How long the probe waits for a delivery receipt
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
    /// How often the node runs a tracked publish against the broker
    #[serde(default = "default_probe_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default = "default_reconnect_delay_secs")]
    pub delay_secs: u64,
    #[serde(default = "default_reconnect_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActuatorSection {
    #[serde(default = "default_blink_hz")]
    pub blink_hz: u32,
}

fn default_keep_alive_secs() -> u64 {
    60
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_telemetry_interval_secs() -> u64 {
    1
}
fn default_block_size() -> usize {
    1024
}
fn default_inter_block_pause_ms() -> u64 {
    100
}
fn default_transfer_interval_secs() -> u64 {
    60
}
fn default_frame_len() -> usize {
    2500
}
fn default_probe_timeout_ms() -> u64 {
    5000
}
fn default_probe_interval_secs() -> u64 {
    30
}
fn default_reconnect_delay_secs() -> u64 {
    5
}
fn default_reconnect_max_retries() -> u32 {
    1
}
fn default_blink_hz() -> u32 {
    10
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            interval_secs: default_telemetry_interval_secs(),
        }
    }
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            inter_block_pause_ms: default_inter_block_pause_ms(),
            interval_secs: default_transfer_interval_secs(),
            frame_len: default_frame_len(),
        }
    }
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout_ms(),
            interval_secs: default_probe_interval_secs(),
        }
    }
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            delay_secs: default_reconnect_delay_secs(),
            max_retries: default_reconnect_max_retries(),
        }
    }
}

impl Default for ActuatorSection {
    fn default() -> Self {
        Self {
            blink_hz: default_blink_hz(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid node ID format: {0}")]
    InvalidNodeId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NodeConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_node_id(&self.node.id)?;
        if self.transfer.block_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "transfer.block_size must be positive".to_string(),
            ));
        }
        if self.actuator.blink_hz == 0 {
            return Err(ConfigError::InvalidConfig(
                "actuator.blink_hz must be positive".to_string(),
            ));
        }
        if self.telemetry.interval_secs == 0
            || self.transfer.interval_secs == 0
            || self.probe.interval_secs == 0
        {
            return Err(ConfigError::InvalidConfig(
                "telemetry, transfer and probe intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.timeout_ms)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[node]
id = "test-node"

[mqtt]
broker_url = "mqtt://localhost:1883"

[topics]
telemetry = "node/env"
transfer = "node/camera"
command = "node/led"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate node ID format
fn validate_node_id(node_id: &str) -> Result<(), ConfigError> {
    let valid_chars = node_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if node_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidNodeId(format!(
            "Node ID '{node_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let toml_content = r#"
[node]
id = "garden-node-1"

[mqtt]
broker_url = "mqtt://192.168.178.36:1883"
username_env = "MQTT_USERNAME"
password_env = "MQTT_PASSWORD"
keep_alive_secs = 30

[topics]
telemetry = "proj/env"
transfer = "proj/camera"
command = "proj/led"

[telemetry]
interval_secs = 2

[transfer]
block_size = 512
inter_block_pause_ms = 50

[probe]
timeout_ms = 2000

[reconnect]
delay_secs = 5
max_retries = 1

[actuator]
blink_hz = 10
"#;

        let config: NodeConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.node.id, "garden-node-1");
        assert_eq!(config.mqtt.broker_url, "mqtt://192.168.178.36:1883");
        assert_eq!(config.mqtt.keep_alive_secs, 30);
        assert_eq!(config.topics.command, "proj/led");
        assert_eq!(config.transfer.block_size, 512);
        assert_eq!(config.reconnect.max_retries, 1);
        assert_eq!(config.actuator.blink_hz, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = NodeConfig::test_config();
        assert_eq!(config.transfer.block_size, 1024);
        assert_eq!(config.transfer.inter_block_pause_ms, 100);
        assert_eq!(config.reconnect.delay_secs, 5);
        assert_eq!(config.reconnect.max_retries, 1);
        assert_eq!(config.actuator.blink_hz, 10);
        assert_eq!(config.probe.timeout_ms, 5000);
        assert_eq!(config.mqtt.keep_alive_secs, 60);
    }

    #[test]
    fn invalid_node_id_is_rejected() {
        assert!(validate_node_id("bad@node").is_err());
        assert!(validate_node_id("").is_err());
        assert!(validate_node_id("node_1.test-x").is_ok());
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let mut config = NodeConfig::test_config();
        config.transfer.block_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_blink_frequency_is_rejected() {
        let mut config = NodeConfig::test_config();
        config.actuator.blink_hz = 0;
        assert!(config.validate().is_err());
    }
}
