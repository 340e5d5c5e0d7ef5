//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use async_trait::async_trait;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use parley_core::{Broker, BrokerError, FrameOutcome};
use parley_protocol::BrokerEntry;
use parley_transport::{FrameSink, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "parley_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "parley_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "parley_connections_rejected_total";
    pub const MESSAGES_TOTAL: &str = "parley_messages_total";
    pub const MESSAGES_BYTES: &str = "parley_messages_bytes";
    pub const CHAT_MESSAGES_TOTAL: &str = "parley_chat_messages_total";
    pub const NAME_REJECTIONS_TOTAL: &str = "parley_name_rejections_total";
    pub const BROKER_PUBLISH_TOTAL: &str = "parley_broker_publish_total";
    pub const BROKER_LATENCY_SECONDS: &str = "parley_broker_publish_seconds";
    pub const ERRORS_TOTAL: &str = "parley_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections refused because the server was full"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of frames processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of frames processed");
    metrics::describe_counter!(names::CHAT_MESSAGES_TOTAL, "Chat messages broadcast");
    metrics::describe_counter!(names::NAME_REJECTIONS_TOTAL, "Refused username claims");
    metrics::describe_counter!(
        names::BROKER_PUBLISH_TOTAL,
        "Broker publish attempts by outcome"
    );
    metrics::describe_histogram!(
        names::BROKER_LATENCY_SECONDS,
        "Broker publish latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a connection refused at the limit.
pub fn record_rejected_connection() {
    counter!(names::CONNECTIONS_REJECTED).increment(1);
}

/// Record a frame.
pub fn record_message(bytes: usize, direction: &str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record what the hub did with an inbound frame.
pub fn record_outcome(outcome: &FrameOutcome) {
    match outcome {
        FrameOutcome::Broadcast(_) => counter!(names::CHAT_MESSAGES_TOTAL).increment(1),
        FrameOutcome::NameRejected(rejection) => {
            counter!(names::NAME_REJECTIONS_TOTAL, "reason" => rejection.reason()).increment(1);
        }
        FrameOutcome::Malformed => record_error("malformed_frame"),
        FrameOutcome::TooLarge => record_error("frame_too_large"),
        FrameOutcome::NameRequired => record_error("name_required"),
        FrameOutcome::Ignored | FrameOutcome::NameAccepted(_) | FrameOutcome::Listed => {}
    }
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

/// Counts outbound frames on their way to the socket.
pub struct MeteredSink<S> {
    inner: S,
}

impl<S> MeteredSink<S> {
    /// Wrap a sink.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: FrameSink> FrameSink for MeteredSink<S> {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.inner.send_text(text).await?;
        record_message(text.len(), "outbound");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close().await
    }
}

/// Records publish outcomes and latency of the wrapped broker.
pub struct MeteredBroker {
    inner: Arc<dyn Broker>,
}

impl MeteredBroker {
    /// Wrap a broker.
    #[must_use]
    pub fn new(inner: Arc<dyn Broker>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Broker for MeteredBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        self.inner.connect().await
    }

    async fn publish(&self, entry: &BrokerEntry) -> Result<(), BrokerError> {
        let start = Instant::now();
        let result = self.inner.publish(entry).await;

        let outcome = match &result {
            Ok(()) => "ok",
            Err(BrokerError::Unavailable(_)) => "unavailable",
            Err(BrokerError::Publish(_)) => "failed",
        };
        counter!(names::BROKER_PUBLISH_TOTAL, "outcome" => outcome).increment(1);
        histogram!(names::BROKER_LATENCY_SECONDS).record(start.elapsed().as_secs_f64());

        result
    }

    async fn close(&self) {
        self.inner.close().await;
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{DisabledBroker, NameRejection};

    #[test]
    fn test_metrics_guard() {
        // Just test that it doesn't panic
        let _guard = ConnectionMetricsGuard::new();
    }

    #[test]
    fn test_record_outcomes() {
        record_outcome(&FrameOutcome::Broadcast(3));
        record_outcome(&FrameOutcome::NameRejected(NameRejection::NameTaken));
        record_outcome(&FrameOutcome::Malformed);
    }

    #[tokio::test]
    async fn test_metered_broker_passes_through() {
        let broker = MeteredBroker::new(Arc::new(DisabledBroker));
        let entry = BrokerEntry {
            username: "alice".into(),
            user_id: 1,
            message: "hi".into(),
            timestamp: "2024-05-01T12:00:00.000Z".into(),
        };

        assert!(matches!(
            broker.publish(&entry).await,
            Err(BrokerError::Unavailable(_))
        ));
        assert!(!broker.is_connected());
    }

    struct NullSink {
        sent: Vec<String>,
    }

    #[async_trait]
    impl FrameSink for NullSink {
        async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
            self.sent.push(text.to_string());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_metered_sink_forwards() {
        let mut sink = MeteredSink::new(NullSink { sent: Vec::new() });
        sink.send_text("hello").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(sink.inner.sent, vec!["hello".to_string()]);
    }
}
