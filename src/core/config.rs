//! Configuration parsing and validation.
//!
//! Configuration is loaded from TOML files with CLI overrides. Every
//! section has defaults, so an empty file is a valid configuration that
//! talks to a local store.

use crate::adapters::redis::client::ConnectOptions;
use crate::adapters::RedisUrl;
use crate::core::runtime::RetryPolicy;
use crate::migration::{StateMigrator, DEFAULT_BACKUP_SUFFIX, DEFAULT_MARKER_SUFFIX};
use crate::state::namespace::DEFAULT_KEY_PREFIX;
use crate::state::KeyNamespace;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backing store connection.
    #[serde(default)]
    pub store: StoreConfig,

    /// Caller-side retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Legacy file migration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Logging.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Backing store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store URL: `redis://[[user]:password@]host[:port][/db]`.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Prefix for every worker key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-command read/write timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub io_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            key_prefix: default_key_prefix(),
            connect_timeout_ms: default_timeout_ms(),
            io_timeout_ms: default_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Connection timeouts.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
        }
    }

    /// Key namespace for the configured prefix.
    pub fn namespace(&self) -> Result<KeyNamespace> {
        KeyNamespace::new(self.key_prefix.clone()).context("invalid store.key_prefix")
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation. 1 disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

/// Migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Legacy snapshot file, if this worker ever had one.
    #[serde(default)]
    pub legacy_path: Option<PathBuf>,

    /// Suffix of the pre-migration backup copy.
    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,

    /// Suffix the original is renamed to once migrated.
    #[serde(default = "default_marker_suffix")]
    pub marker_suffix: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            legacy_path: None,
            backup_suffix: default_backup_suffix(),
            marker_suffix: default_marker_suffix(),
        }
    }
}

impl MigrationConfig {
    /// Build a migrator for `path`, or the configured legacy path.
    pub fn migrator(&self, path: Option<&Path>) -> Result<StateMigrator> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| self.legacy_path.clone())
            .context("no legacy path given and migration.legacy_path is not set")?;
        Ok(StateMigrator::with_suffixes(
            path,
            &self.backup_suffix,
            &self.marker_suffix,
        ))
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    1
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_backup_suffix() -> String {
    DEFAULT_BACKUP_SUFFIX.to_string()
}

fn default_marker_suffix() -> String {
    DEFAULT_MARKER_SUFFIX.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref url) = overrides.store_url {
            self.store.url = url.clone();
        }
        if let Some(ref prefix) = overrides.key_prefix {
            self.store.key_prefix = prefix.clone();
        }
        if let Some(ref path) = overrides.legacy_path {
            self.migration.legacy_path = Some(path.clone());
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_store()?;
        self.validate_retry()?;
        self.validate_migration()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_store(&self) -> Result<()> {
        if self.store.key_prefix.is_empty() {
            anyhow::bail!("store.key_prefix must not be empty");
        }
        RedisUrl::parse(&self.store.url)
            .with_context(|| format!("invalid store.url: {}", self.store.url))?;
        if self.store.connect_timeout_ms == 0 {
            anyhow::bail!("store.connect_timeout_ms must be > 0");
        }
        if self.store.io_timeout_ms == 0 {
            anyhow::bail!("store.io_timeout_ms must be > 0");
        }
        Ok(())
    }

    fn validate_retry(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be >= 1");
        }
        Ok(())
    }

    fn validate_migration(&self) -> Result<()> {
        let m = &self.migration;
        if m.backup_suffix.is_empty() || m.marker_suffix.is_empty() {
            anyhow::bail!("migration.backup_suffix and migration.marker_suffix must not be empty");
        }
        if m.backup_suffix == m.marker_suffix {
            anyhow::bail!(
                "migration.backup_suffix and migration.marker_suffix must differ, both are {}",
                m.backup_suffix
            );
        }
        if m.backup_suffix.contains('/') || m.marker_suffix.contains('/') {
            anyhow::bail!("migration suffixes must not contain path separators");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override store URL.
    pub store_url: Option<String>,
    /// Override key prefix.
    pub key_prefix: Option<String>,
    /// Override legacy file path.
    pub legacy_path: Option<PathBuf>,
}
