//! Configuration system for the PHANTOM CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// PHANTOM configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Cloud server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Fleet configuration
    #[serde(default)]
    pub fleet: FleetConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cloud server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server address (`host:port`, schemes are stripped)
    #[serde(default = "default_server_address")]
    pub address: String,
    /// Path to the server's RSA public key (PKCS#8 PEM)
    #[serde(default = "default_server_key_file")]
    pub public_key_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            public_key_file: default_server_key_file(),
        }
    }
}

/// Fleet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Number of simulated devices
    #[serde(default = "default_device_count")]
    pub device_count: usize,
    /// Directory holding device key files (`<id>.pem`)
    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,
    /// Artificial per-chunk network delay in milliseconds
    #[serde(default)]
    pub network_delay_ms: u64,
    /// Event name webhook sends publish to
    #[serde(default = "default_webhook_event")]
    pub webhook_event: String,
    /// Interval between fleet-wide webhook bursts, in milliseconds
    /// (absent = no periodic webhooks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_interval_ms: Option<u64>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            device_count: default_device_count(),
            keys_dir: default_keys_dir(),
            network_delay_ms: 0,
            webhook_event: default_webhook_event(),
            webhook_interval_ms: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values

fn default_server_address() -> String {
    "127.0.0.1:5683".to_string()
}

fn phantom_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".phantom")
}

fn default_server_key_file() -> PathBuf {
    phantom_home().join("server_key.pub.pem")
}

fn default_keys_dir() -> PathBuf {
    phantom_home().join("keys")
}

fn default_device_count() -> usize {
    10
}

fn default_webhook_event() -> String {
    "phantom/webhook".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Default config file location
    #[must_use]
    pub fn default_path() -> PathBuf {
        phantom_home().join("config.toml")
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        let config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Load the default config file, or fall back to defaults when it
    /// does not exist.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate ranges and referenced paths.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fleet.device_count == 0 {
            anyhow::bail!("fleet.device_count must be at least 1");
        }
        if self.fleet.device_count > 100_000 {
            anyhow::bail!("fleet.device_count {} is unreasonably large", self.fleet.device_count);
        }
        if self.server.address.trim().is_empty() {
            anyhow::bail!("server.address must not be empty");
        }
        if self.fleet.webhook_event.is_empty() {
            anyhow::bail!("fleet.webhook_event must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            [server]
            address = "tcp://cloud.example:5683"

            [fleet]
            device_count = 3
            network_delay_ms = 50
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.address, "tcp://cloud.example:5683");
        assert_eq!(config.fleet.device_count, 3);
        assert_eq!(config.fleet.network_delay_ms, 50);
        // Omitted sections fall back to defaults
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.fleet.webhook_event, "phantom/webhook");
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_devices_rejected() {
        let mut config = Config::default();
        config.fleet.device_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(&missing).is_err());
    }

    #[test]
    fn test_roundtrip_serialization() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let restored: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(restored.fleet.device_count, config.fleet.device_count);
        assert_eq!(restored.server.address, config.server.address);
    }
}
