//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries, and [`TestConfigFile`] when
//! a test needs the config on disk.

use std::path::PathBuf;

use syncmate_config::AppConfig;
use tempfile::TempDir;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .daemon_url(&daemon.url())
///     .api_key("test-key")
///     .probe_interval_ms(5)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn daemon_url(mut self, url: &str) -> Self {
        self.config.daemon.url = url.to_string();
        self
    }

    pub fn api_key(mut self, key: &str) -> Self {
        self.config.daemon.api_key = Some(key.to_string());
        self
    }

    pub fn health_path(mut self, path: &str) -> Self {
        self.config.daemon.health_path = path.to_string();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.client.request_timeout_secs = secs;
        self
    }

    pub fn probe_interval_ms(mut self, ms: u64) -> Self {
        self.config.client.probe_interval_ms = ms;
        self
    }

    pub fn probe_max_attempts(mut self, attempts: u32) -> Self {
        self.config.client.probe_max_attempts = attempts;
        self
    }

    pub fn file_size_units(mut self, units: &[&str]) -> Self {
        self.config.display.file_size_units = units.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A TOML config file in an owned temp directory.
///
/// The temp directory is deleted automatically when this value is dropped,
/// guaranteeing cleanup even on panic.
pub struct TestConfigFile {
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TestConfigFile {
    /// Write `toml_content` to `syncmate.toml` in a fresh temp directory.
    pub async fn with_toml(toml_content: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("syncmate.toml");
        tokio::fs::write(&path, toml_content)
            .await
            .expect("failed to write test config");

        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Load and validate the file.
    pub async fn load(&self) -> AppConfig {
        AppConfig::load(&self.path)
            .await
            .expect("failed to parse test config")
    }
}
