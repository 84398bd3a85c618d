//! Client configuration
//!
//! Loaded from TOML. Only `[broker]` is required; every other section falls
//! back to defaults (5 s reconnect ceiling, 25 ms write timeout, 10 ms
//! disconnect grace).

use crate::connection::ReconnectPolicy;
use crate::protocol::Dialect;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub broker: BrokerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub status: StatusSection,
}

/// Broker address and client identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub client_id: String,
}

impl BrokerSection {
    /// Broker address in `tcp://<host>:<port>` form
    pub fn broker_url(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

fn default_port() -> u16 {
    1883
}

/// Wire format and transport diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    #[serde(default)]
    pub dialect: Dialect,
    /// Raise transport (rumqttc) log output to debug level
    #[serde(default)]
    pub debug: bool,
}

/// Reconnection and timeout settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_cleanup_grace_ms")]
    pub cleanup_grace_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            cleanup_grace_ms: default_cleanup_grace_ms(),
        }
    }
}

impl ReconnectSection {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            auto_reconnect: self.auto_reconnect,
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_millis(self.cleanup_grace_ms)
    }
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_initial_interval_ms() -> u64 {
    1000
}

fn default_max_interval_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_write_timeout_ms() -> u64 {
    25
}

fn default_cleanup_grace_ms() -> u64 {
    10
}

/// Device paths reported by this client
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusSection {
    #[serde(default)]
    pub entity_paths: Vec<String>,
    /// RUNNING republish interval; 0 disables the heartbeat
    #[serde(default)]
    pub heartbeat_interval_secs: u64,
}

impl StatusSection {
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0).then(|| Duration::from_secs(self.heartbeat_interval_secs))
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Minimal configuration for a broker, everything else defaulted
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            broker: BrokerSection {
                host: host.into(),
                port,
                client_id: client_id.into(),
            },
            client: ClientSection::default(),
            reconnect: ReconnectSection::default(),
            status: StatusSection::default(),
        }
    }

    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.host must not be empty".to_string(),
            ));
        }
        if self.broker.client_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.client_id must not be empty".to_string(),
            ));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.port must not be 0".to_string(),
            ));
        }
        let reconnect = &self.reconnect;
        if reconnect.initial_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.initial_interval_ms must be positive".to_string(),
            ));
        }
        if reconnect.max_interval_ms < reconnect.initial_interval_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "reconnect.max_interval_ms ({}) is below reconnect.initial_interval_ms ({})",
                reconnect.max_interval_ms, reconnect.initial_interval_ms
            )));
        }
        if reconnect.connect_timeout_ms == 0 || reconnect.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "connect and write timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
