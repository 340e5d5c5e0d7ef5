//! Redis Streams implementation of [`Broker`].
//!
//! The gateway owns its connection. A failed or missing connection is
//! re-established lazily on the next publish, at most once per
//! `reconnect_interval`; once connected, [`ConnectionManager`] reconnects
//! transparently.

use crate::config::BrokerConfig;
use crate::error::classify;
use crate::{ensure_group, DELIVERY_FIELD, PAYLOAD_FIELD, PERSISTENT};
use async_trait::async_trait;
use parley_core::{Broker, BrokerError};
use parley_protocol::BrokerEntry;
use redis::aio::ConnectionManager;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace};

#[derive(Default)]
struct State {
    conn: Option<ConnectionManager>,
    last_attempt: Option<Instant>,
}

/// Publishes chat messages to a Redis stream.
pub struct RedisStreamGateway {
    client: redis::Client,
    config: BrokerConfig,
    state: Mutex<State>,
    connected: AtomicBool,
}

impl RedisStreamGateway {
    /// Create a gateway for `config.url`. No connection is made yet.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Unavailable`] if the URL is invalid.
    pub fn new(config: BrokerConfig) -> Result<Self, BrokerError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| BrokerError::Unavailable(format!("invalid broker url: {e}")))?;

        Ok(Self {
            client,
            config,
            state: Mutex::new(State::default()),
            connected: AtomicBool::new(false),
        })
    }

    async fn open(&self, state: &mut State) -> Result<ConnectionManager, BrokerError> {
        state.last_attempt = Some(Instant::now());

        let mut conn = match timeout(
            self.config.connect_timeout(),
            self.client.get_connection_manager(),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(BrokerError::Unavailable(e.to_string())),
            Err(_) => return Err(BrokerError::Unavailable("connect timed out".into())),
        };

        let created = ensure_group(&mut conn, &self.config.queue, &self.config.consumer_group)
            .await
            .map_err(|e| classify(&e))?;

        info!(
            queue = %self.config.queue,
            group = %self.config.consumer_group,
            created,
            "Connected to broker"
        );

        state.conn = Some(conn.clone());
        self.connected.store(true, Ordering::Release);
        Ok(conn)
    }

    async fn connection(&self) -> Result<ConnectionManager, BrokerError> {
        let mut state = self.state.lock().await;
        if let Some(conn) = &state.conn {
            return Ok(conn.clone());
        }

        if let Some(last) = state.last_attempt {
            if last.elapsed() < self.config.reconnect_interval() {
                return Err(BrokerError::Unavailable("waiting to reconnect".into()));
            }
        }

        debug!(url = %self.config.url, "Reconnecting to broker");
        self.open(&mut state).await
    }
}

#[async_trait]
impl Broker for RedisStreamGateway {
    async fn connect(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        if state.conn.is_some() {
            return Ok(());
        }
        self.open(&mut state).await.map(|_| ())
    }

    async fn publish(&self, entry: &BrokerEntry) -> Result<(), BrokerError> {
        let payload = entry
            .to_bytes()
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.config.queue)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&payload[..])
            .arg(DELIVERY_FIELD)
            .arg(PERSISTENT);

        let result: redis::RedisResult<String> =
            match timeout(self.config.publish_timeout(), cmd.query_async(&mut conn)).await {
                Ok(result) => result,
                Err(_) => {
                    self.connected.store(false, Ordering::Release);
                    return Err(BrokerError::Unavailable("publish timed out".into()));
                }
            };

        match result {
            Ok(id) => {
                self.connected.store(true, Ordering::Release);
                trace!(id = %id, queue = %self.config.queue, "Entry appended");
                Ok(())
            }
            Err(e) => {
                let err = classify(&e);
                if matches!(err, BrokerError::Unavailable(_)) {
                    self.connected.store(false, Ordering::Release);
                }
                Err(err)
            }
        }
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.conn.take().is_some() {
            info!(queue = %self.config.queue, "Broker connection closed");
        }
        self.connected.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
