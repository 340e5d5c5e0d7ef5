//! Transport abstraction traits for Parley.
//!
//! The writer side of a connection only needs to push text frames and close,
//! so that is all [`FrameSink`] asks of a transport.

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// The outbound half of a client connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame to the client.
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}
