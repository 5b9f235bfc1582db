#![deny(unsafe_code)]

//! Configuration loading and validation for syncmate.
//!
//! Loads the TOML configuration file that tells the control plane where the
//! sync daemon's management interface lives, how to authenticate against it,
//! how patiently to wait for it, and how to label human-readable sizes.
//! [`AppConfig`] is the central configuration structure.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the daemon's HTTP management interface lives.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Request and readiness-probe timing.
    #[serde(default)]
    pub client: ClientConfig,

    /// Unit labels for human-readable sizes and rates.
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the sync daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Base URL of the daemon's web GUI / REST interface.
    #[serde(default = "default_daemon_url")]
    pub url: String,

    /// API key attached to every request. `None` sends no key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Path polled by the readiness prober.
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            url: default_daemon_url(),
            api_key: None,
            health_path: default_health_path(),
        }
    }
}

fn default_daemon_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_health_path() -> String {
    "/".to_string()
}

/// Request timeout and readiness probing cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Delay between two readiness probes, in milliseconds.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Number of probes before giving up on the daemon.
    #[serde(default = "default_probe_max_attempts")]
    pub probe_max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            probe_interval_ms: default_probe_interval_ms(),
            probe_max_attempts: default_probe_max_attempts(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_probe_interval_ms() -> u64 {
    1000
}

fn default_probe_max_attempts() -> u32 {
    60
}

/// Unit labels used by the readable size and transfer-rate formatters.
///
/// Index `n` labels values scaled by `1024^n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_file_size_units")]
    pub file_size_units: Vec<String>,

    #[serde(default = "default_transfer_rate_units")]
    pub transfer_rate_units: Vec<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            file_size_units: default_file_size_units(),
            transfer_rate_units: default_transfer_rate_units(),
        }
    }
}

fn default_file_size_units() -> Vec<String> {
    ["B", "KB", "MB", "GB", "TB"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_transfer_rate_units() -> Vec<String> {
    ["b/s", "Kb/s", "Mb/s", "Gb/s", "Tb/s"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
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

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.daemon.url.as_str();
        if url.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.url must not be empty".to_string(),
            ));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "daemon.url must start with http:// or https://, got {url:?}"
            )));
        }
        if !self.daemon.health_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "daemon.health_path must start with '/', got {:?}",
                self.daemon.health_path
            )));
        }
        if self
            .daemon
            .api_key
            .as_deref()
            .is_some_and(|key| key.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "daemon.api_key must not be blank when set".to_string(),
            ));
        }

        if self.client.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "client.request_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.client.probe_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "client.probe_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.client.probe_max_attempts == 0 {
            return Err(ConfigError::Validation(
                "client.probe_max_attempts must be at least 1".to_string(),
            ));
        }

        if self.display.file_size_units.is_empty() {
            return Err(ConfigError::Validation(
                "display.file_size_units must not be empty".to_string(),
            ));
        }
        if self.display.transfer_rate_units.is_empty() {
            return Err(ConfigError::Validation(
                "display.transfer_rate_units must not be empty".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}
