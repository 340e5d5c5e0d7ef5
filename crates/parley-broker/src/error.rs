//! Error types and Redis error classification.

use parley_core::BrokerError;
use thiserror::Error;

/// Errors raised by [`crate::StreamConsumer`].
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Redis returned an error or the connection failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Connecting took longer than the configured timeout.
    #[error("Connection timed out")]
    ConnectTimeout,

    /// No connection has been established yet.
    #[error("Not connected")]
    NotConnected,
}

impl ConsumerError {
    /// Whether the error means the connection is unusable.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            ConsumerError::Redis(e) => is_unavailable(e),
            ConsumerError::ConnectTimeout | ConsumerError::NotConnected => true,
        }
    }
}

fn is_unavailable(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout()
}

/// Map a Redis error onto the broker contract.
pub(crate) fn classify(err: &redis::RedisError) -> BrokerError {
    if is_unavailable(err) {
        BrokerError::Unavailable(err.to_string())
    } else {
        BrokerError::Publish(err.to_string())
    }
}
