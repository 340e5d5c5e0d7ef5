//! Consumer-group reader for the queue stream.
//!
//! Entries are read one at a time. An entry stays pending in the group until
//! [`StreamConsumer::ack`] is called for it, so anything not acknowledged is
//! handed out again by [`StreamConsumer::next_pending`].

use crate::config::BrokerConfig;
use crate::error::ConsumerError;
use crate::{ensure_group, PAYLOAD_FIELD};
use redis::aio::ConnectionManager;
use redis::streams::StreamReadReply;
use redis::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// One entry read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Stream entry id.
    pub id: String,
    /// Raw payload field, if present.
    pub payload: Option<Vec<u8>>,
}

impl Delivery {
    fn from_fields(id: String, fields: &HashMap<String, Value>) -> Self {
        let payload = match fields.get(PAYLOAD_FIELD) {
            Some(Value::BulkString(bytes)) => Some(bytes.clone()),
            Some(Value::SimpleString(text)) => Some(text.clone().into_bytes()),
            _ => None,
        };
        Self { id, payload }
    }
}

/// Reads the queue stream as one member of a consumer group.
pub struct StreamConsumer {
    client: redis::Client,
    queue: String,
    group: String,
    name: String,
    connect_timeout: Duration,
    conn: Option<ConnectionManager>,
}

impl StreamConsumer {
    /// Create a consumer called `name`. No connection is made yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker URL is invalid.
    pub fn new(config: &BrokerConfig, name: impl Into<String>) -> Result<Self, ConsumerError> {
        Ok(Self {
            client: redis::Client::open(config.url.as_str())?,
            queue: config.queue.clone(),
            group: config.consumer_group.clone(),
            name: name.into(),
            connect_timeout: config.connect_timeout(),
            conn: None,
        })
    }

    /// Get the consumer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a connection has been established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Connect and join the consumer group, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker cannot be reached.
    pub async fn connect(&mut self) -> Result<(), ConsumerError> {
        let mut conn = timeout(self.connect_timeout, self.client.get_connection_manager())
            .await
            .map_err(|_| ConsumerError::ConnectTimeout)??;

        let created = ensure_group(&mut conn, &self.queue, &self.group).await?;
        info!(
            queue = %self.queue,
            group = %self.group,
            consumer = %self.name,
            created,
            "Joined consumer group"
        );

        self.conn = Some(conn);
        Ok(())
    }

    /// Drop the connection; the next call must [`connect`](Self::connect)
    /// again.
    pub fn disconnect(&mut self) {
        self.conn = None;
    }

    /// Read the next entry already delivered to this consumer but not yet
    /// acknowledged, with an id greater than `after`.
    ///
    /// Pass `"0"` to start from the oldest pending entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn next_pending(&mut self, after: &str) -> Result<Option<Delivery>, ConsumerError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.name)
            .arg("COUNT")
            .arg(1)
            .arg("STREAMS")
            .arg(&self.queue)
            .arg(after);

        self.read(cmd).await
    }

    /// Wait up to `block` for an entry never delivered to any consumer of
    /// the group.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn next_new(&mut self, block: Duration) -> Result<Option<Delivery>, ConsumerError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.name)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.queue)
            .arg(">");

        self.read(cmd).await
    }

    /// Acknowledge an entry so it is never delivered again.
    ///
    /// # Errors
    ///
    /// Returns an error if the acknowledgment fails.
    pub async fn ack(&mut self, id: &str) -> Result<(), ConsumerError> {
        let conn = self.conn.as_mut().ok_or(ConsumerError::NotConnected)?;

        let acked: i64 = redis::cmd("XACK")
            .arg(&self.queue)
            .arg(&self.group)
            .arg(id)
            .query_async(conn)
            .await?;

        debug!(id = %id, acked, "Entry acknowledged");
        Ok(())
    }

    async fn read(&mut self, cmd: redis::Cmd) -> Result<Option<Delivery>, ConsumerError> {
        let conn = self.conn.as_mut().ok_or(ConsumerError::NotConnected)?;
        let reply: Option<StreamReadReply> = cmd.query_async(conn).await?;

        Ok(reply.and_then(|reply| {
            reply
                .keys
                .into_iter()
                .flat_map(|key| key.ids)
                .next()
                .map(|entry| Delivery::from_fields(entry.id, &entry.map))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_reads_payload_field() {
        let mut fields = HashMap::new();
        fields.insert(
            PAYLOAD_FIELD.to_string(),
            Value::BulkString(br#"{"username":"alice"}"#.to_vec()),
        );
        fields.insert(
            crate::DELIVERY_FIELD.to_string(),
            Value::BulkString(b"persistent".to_vec()),
        );

        let delivery = Delivery::from_fields("1-0".into(), &fields);
        assert_eq!(delivery.id, "1-0");
        assert_eq!(delivery.payload.as_deref(), Some(&br#"{"username":"alice"}"#[..]));
    }

    #[test]
    fn test_delivery_without_payload() {
        let delivery = Delivery::from_fields("2-0".into(), &HashMap::new());
        assert_eq!(delivery.payload, None);
    }

    #[tokio::test]
    async fn test_read_requires_connection() {
        let mut consumer = StreamConsumer::new(&BrokerConfig::default(), "archiver-test").unwrap();

        assert!(!consumer.is_connected());
        assert!(matches!(
            consumer.next_pending("0").await,
            Err(ConsumerError::NotConnected)
        ));
        assert!(matches!(
            consumer.ack("1-0").await,
            Err(ConsumerError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_unreachable() {
        let config = BrokerConfig {
            url: "redis://127.0.0.1:1".into(),
            connect_timeout_ms: 200,
            ..Default::default()
        };
        let mut consumer = StreamConsumer::new(&config, "archiver-test").unwrap();

        let err = consumer.connect().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(!consumer.is_connected());
    }
}
