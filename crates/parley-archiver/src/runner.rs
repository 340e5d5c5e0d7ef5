//! The consume loop.
//!
//! Entries are handled strictly one at a time: read, archive, acknowledge.
//! Anything not acknowledged stays pending in the consumer group and is
//! replayed at start and every `redelivery_interval`.

use crate::archive::{self, ArchiveSink, Disposition};
use crate::config::ArchiveConfig;
use parley_broker::{ConsumerError, Delivery, StreamConsumer};
use std::future::Future;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Moves entries from the queue into an archive sink.
pub struct Archiver<S> {
    consumer: StreamConsumer,
    sink: S,
    settings: ArchiveConfig,
    archived: u64,
}

impl<S: ArchiveSink> Archiver<S> {
    /// Create an archiver; nothing is read until [`run`](Self::run).
    pub fn new(consumer: StreamConsumer, sink: S, settings: ArchiveConfig) -> Self {
        Self {
            consumer,
            sink,
            settings,
            archived: 0,
        }
    }

    /// Consume until `shutdown` resolves and return the number of entries
    /// archived. The entry being processed when it fires is finished first.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> u64 {
        tokio::pin!(shutdown);
        let mut next_replay = Instant::now();

        loop {
            if !self.consumer.is_connected() {
                if let Err(e) = self.consumer.connect().await {
                    warn!(error = %e, "Broker unavailable, retrying");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = sleep(self.settings.retry_delay()) => continue,
                    }
                }
                next_replay = Instant::now();
            }

            if Instant::now() >= next_replay {
                match self.replay_pending().await {
                    Ok(0) => {}
                    Ok(replayed) => info!(replayed, "Pending entries replayed"),
                    Err(e) => {
                        self.on_error(&e);
                        tokio::select! {
                            _ = &mut shutdown => break,
                            _ = sleep(self.settings.retry_delay()) => continue,
                        }
                    }
                }
                next_replay = Instant::now() + self.settings.redelivery_interval();
            }

            let read = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                read = self.consumer.next_new(self.settings.block()) => read,
            };

            match read {
                Ok(Some(delivery)) => {
                    if let Err(e) = self.handle(delivery).await {
                        self.on_error(&e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.on_error(&e);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = sleep(self.settings.retry_delay()) => {}
                    }
                }
            }
        }

        info!(archived = self.archived, "Archiver stopped");
        self.archived
    }

    /// Walk this consumer's pending entries once, oldest first.
    ///
    /// Entries that fail again are skipped until the next replay.
    async fn replay_pending(&mut self) -> Result<usize, ConsumerError> {
        let mut cursor = String::from("0");
        let mut replayed = 0;

        while let Some(delivery) = self.consumer.next_pending(&cursor).await? {
            cursor.clone_from(&delivery.id);
            self.handle(delivery).await?;
            replayed += 1;
        }

        Ok(replayed)
    }

    async fn handle(&mut self, delivery: Delivery) -> Result<(), ConsumerError> {
        match archive::process(delivery.payload.as_deref(), &mut self.sink).await {
            Disposition::Ack => {
                self.consumer.ack(&delivery.id).await?;
                self.archived += 1;
                debug!(id = %delivery.id, "Entry archived");
            }
            Disposition::Retain => {
                warn!(id = %delivery.id, "Entry left pending");
            }
        }
        Ok(())
    }

    fn on_error(&mut self, e: &ConsumerError) {
        warn!(error = %e, "Consumer error");
        if e.is_connection_error() {
            self.consumer.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveLog;
    use parley_broker::BrokerConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stops_while_broker_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let log = ArchiveLog::open(dir.path().join("archive.log")).await.unwrap();

        let broker = BrokerConfig {
            url: "redis://127.0.0.1:1".into(),
            connect_timeout_ms: 100,
            ..Default::default()
        };
        let consumer = StreamConsumer::new(&broker, "archiver-test").unwrap();
        let settings = ArchiveConfig {
            retry_delay_ms: 50,
            ..Default::default()
        };

        let archiver = Archiver::new(consumer, log, settings);
        let archived = tokio::time::timeout(
            Duration::from_secs(5),
            archiver.run(sleep(Duration::from_millis(300))),
        )
        .await
        .expect("archiver did not stop");

        assert_eq!(archived, 0);
    }
}
