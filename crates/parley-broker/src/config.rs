//! Broker configuration, shared by the server and the archiver.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Durable queue configuration (`[broker]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Publish chat messages to the queue.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Redis connection URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// Stream name of the queue.
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Consumer group the archivers read through.
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Publish timeout in milliseconds.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,

    /// Minimum delay between reconnect attempts in milliseconds.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Entries buffered for publication before new ones are dropped.
    #[serde(default = "default_backlog")]
    pub backlog: usize,

    /// Time allowed to flush buffered entries on shutdown, in milliseconds.
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_url() -> String {
    std::env::var("PARLEY_BROKER_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn default_queue() -> String {
    "chat.messages".to_string()
}

fn default_consumer_group() -> String {
    "archivers".to_string()
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_publish_timeout() -> u64 {
    2000
}

fn default_reconnect_interval() -> u64 {
    5000
}

fn default_backlog() -> usize {
    1024
}

fn default_flush_timeout() -> u64 {
    3000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_url(),
            queue: default_queue(),
            consumer_group: default_consumer_group(),
            connect_timeout_ms: default_connect_timeout(),
            publish_timeout_ms: default_publish_timeout(),
            reconnect_interval_ms: default_reconnect_interval(),
            backlog: default_backlog(),
            flush_timeout_ms: default_flush_timeout(),
        }
    }
}

impl BrokerConfig {
    /// Connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Publish timeout.
    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// Minimum delay between reconnect attempts.
    #[must_use]
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Shutdown flush budget.
    #[must_use]
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.queue, "chat.messages");
        assert_eq!(config.consumer_group, "archivers");
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.flush_timeout(), Duration::from_secs(3));
        assert_eq!(config.backlog, 1024);
    }

    #[test]
    fn test_partial_toml() {
        let config: BrokerConfig = toml::from_str(
            r#"
            url = "redis://queue.internal:6380"
            queue = "chat.test"
            publish_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.url, "redis://queue.internal:6380");
        assert_eq!(config.queue, "chat.test");
        assert_eq!(config.publish_timeout(), Duration::from_millis(250));
        assert_eq!(config.reconnect_interval(), Duration::from_secs(5));
        assert!(config.enabled);
    }
}
