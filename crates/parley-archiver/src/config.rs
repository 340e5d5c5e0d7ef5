//! Archiver configuration.
//!
//! Loaded from the file named by `PARLEY_ARCHIVER_CONFIG`, else
//! `parley-archiver.toml`, else defaults.

use anyhow::{Context, Result};
use parley_broker::BrokerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Archiver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiverConfig {
    /// Queue connection.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Archive settings.
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Append-only log file.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Name of this consumer within the group.
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// How long one read waits for new entries, in milliseconds.
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,

    /// How often unacknowledged entries are retried, in milliseconds.
    #[serde(default = "default_redelivery_interval")]
    pub redelivery_interval_ms: u64,

    /// Delay before reconnecting after a broker failure, in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_log_path() -> PathBuf {
    PathBuf::from("messages-archive.log")
}

fn default_consumer_name() -> String {
    "archiver-1".to_string()
}

fn default_block_ms() -> u64 {
    1000
}

fn default_redelivery_interval() -> u64 {
    30_000
}

fn default_retry_delay() -> u64 {
    5000
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            consumer_name: default_consumer_name(),
            block_ms: default_block_ms(),
            redelivery_interval_ms: default_redelivery_interval(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl ArchiveConfig {
    /// Read block duration.
    #[must_use]
    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    /// Pending replay interval.
    #[must_use]
    pub fn redelivery_interval(&self) -> Duration {
        Duration::from_millis(self.redelivery_interval_ms)
    }

    /// Reconnect delay.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl ArchiverConfig {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("PARLEY_ARCHIVER_CONFIG") {
            return Self::from_file(shellexpand::tilde(&path).as_ref());
        }

        let default_path = Path::new("parley-archiver.toml");
        if default_path.exists() {
            return Self::from_file(default_path);
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ArchiverConfig::default();
        assert_eq!(config.archive.log_path, PathBuf::from("messages-archive.log"));
        assert_eq!(config.archive.consumer_name, "archiver-1");
        assert_eq!(config.archive.block(), Duration::from_secs(1));
        assert_eq!(config.broker.consumer_group, "archivers");
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archiver.toml");
        std::fs::write(
            &path,
            r#"
            [broker]
            queue = "chat.test"

            [archive]
            log_path = "/var/log/parley/archive.log"
            consumer_name = "archiver-2"
            "#,
        )
        .unwrap();

        let config = ArchiverConfig::from_file(&path).unwrap();
        assert_eq!(config.broker.queue, "chat.test");
        assert_eq!(config.archive.consumer_name, "archiver-2");
        assert_eq!(
            config.archive.log_path,
            PathBuf::from("/var/log/parley/archive.log")
        );
        assert_eq!(config.archive.redelivery_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(ArchiverConfig::from_file("/nonexistent/parley-archiver.toml").is_err());
    }
}
