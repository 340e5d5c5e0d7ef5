//! Broker contract and the non-blocking publisher.
//!
//! The hub hands every chat message to a [`Publisher`], which queues it and
//! lets a background task await the actual [`Broker::publish`]. Slow or
//! failing brokers therefore never delay chat delivery.

use async_trait::async_trait;
use parley_protocol::BrokerEntry;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Broker errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// No usable connection to the broker.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The broker refused or failed the publish.
    #[error("Broker publish failed: {0}")]
    Publish(String),
}

/// A durable queue that chat messages are published to.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establish the connection and make sure the queue exists.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Publish one entry with the persistence flag set.
    async fn publish(&self, entry: &BrokerEntry) -> Result<(), BrokerError>;

    /// Release the connection.
    async fn close(&self);

    /// Check whether a connection is currently established.
    fn is_connected(&self) -> bool;
}

/// A broker that is switched off; every publish reports it unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledBroker;

#[async_trait]
impl Broker for DisabledBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        Err(BrokerError::Unavailable("broker disabled".into()))
    }

    async fn publish(&self, _entry: &BrokerEntry) -> Result<(), BrokerError> {
        Err(BrokerError::Unavailable("broker disabled".into()))
    }

    async fn close(&self) {}

    fn is_connected(&self) -> bool {
        false
    }
}

/// Queues broker entries and publishes them from a background task.
pub struct Publisher {
    tx: mpsc::Sender<BrokerEntry>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Publisher {
    /// Spawn the publishing task on the current tokio runtime.
    ///
    /// `backlog` bounds the number of entries waiting to be published.
    #[must_use]
    pub fn spawn(broker: Arc<dyn Broker>, backlog: usize) -> Self {
        let (tx, rx) = mpsc::channel(backlog.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(broker, rx, shutdown_rx));

        Self {
            tx,
            shutdown: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue an entry for publication without waiting.
    ///
    /// Returns `false` if the entry was dropped because the backlog is full
    /// or the publisher has shut down.
    pub fn submit(&self, entry: BrokerEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(entry)) => {
                warn!(username = %entry.username, "Broker backlog full, dropping entry");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Publisher stopped, dropping entry");
                false
            }
        }
    }

    /// Flush queued entries and close the broker, waiting at most
    /// `flush_timeout`.
    pub async fn shutdown(&self, flush_timeout: Duration) {
        if let Some(signal) = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = signal.send(());
        }

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut task) = task {
            if tokio::time::timeout(flush_timeout, &mut task).await.is_err() {
                warn!(
                    timeout_ms = flush_timeout.as_millis() as u64,
                    "Broker flush timed out, abandoning queued entries"
                );
                task.abort();
            }
        }
    }
}

async fn run(
    broker: Arc<dyn Broker>,
    mut rx: mpsc::Receiver<BrokerEntry>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            entry = rx.recv() => match entry {
                Some(entry) => publish_one(broker.as_ref(), &entry).await,
                None => break,
            },

            _ = &mut shutdown => {
                rx.close();
                let mut flushed = 0usize;
                while let Some(entry) = rx.recv().await {
                    publish_one(broker.as_ref(), &entry).await;
                    flushed += 1;
                }
                debug!(flushed, "Publisher drained");
                break;
            }
        }
    }

    broker.close().await;
    info!("Publisher stopped");
}

async fn publish_one(broker: &dyn Broker, entry: &BrokerEntry) {
    match broker.publish(entry).await {
        Ok(()) => trace!(username = %entry.username, "Entry published"),
        Err(e) => warn!(username = %entry.username, error = %e, "Failed to publish entry"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingBroker {
        published: Mutex<Vec<BrokerEntry>>,
        closed: AtomicBool,
        fail: bool,
    }

    #[async_trait]
    impl Broker for RecordingBroker {
        async fn connect(&self) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn publish(&self, entry: &BrokerEntry) -> Result<(), BrokerError> {
            if self.fail {
                return Err(BrokerError::Publish("nope".into()));
            }
            self.published.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn entry(text: &str) -> BrokerEntry {
        BrokerEntry {
            username: "alice".into(),
            user_id: 1,
            message: text.into(),
            timestamp: "2024-05-01T12:00:00.000Z".into(),
        }
    }

    #[tokio::test]
    async fn test_entries_published_in_order() {
        let broker = Arc::new(RecordingBroker::default());
        let publisher = Publisher::spawn(broker.clone(), 16);

        assert!(publisher.submit(entry("one")));
        assert!(publisher.submit(entry("two")));
        publisher.shutdown(Duration::from_secs(1)).await;

        let published = broker.published.lock().unwrap();
        let texts: Vec<_> = published.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert!(broker.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let broker = Arc::new(RecordingBroker {
            fail: true,
            ..Default::default()
        });
        let publisher = Publisher::spawn(broker.clone(), 16);

        assert!(publisher.submit(entry("lost")));
        publisher.shutdown(Duration::from_secs(1)).await;

        assert!(broker.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_dropped() {
        let publisher = Publisher::spawn(Arc::new(DisabledBroker), 4);
        publisher.shutdown(Duration::from_secs(1)).await;

        assert!(!publisher.submit(entry("late")));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let publisher = Publisher::spawn(Arc::new(DisabledBroker), 4);
        publisher.shutdown(Duration::from_millis(100)).await;
        publisher.shutdown(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_disabled_broker() {
        let broker = DisabledBroker;
        assert!(!broker.is_connected());
        assert!(matches!(
            broker.publish(&entry("x")).await,
            Err(BrokerError::Unavailable(_))
        ));
    }
}
