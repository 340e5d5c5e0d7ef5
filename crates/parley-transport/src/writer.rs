//! Per-connection writer task.

use crate::outbox::OutboxReceiver;
use crate::traits::{FrameSink, TransportError};
use tracing::{debug, trace};

/// Drain an outbox into a sink until the queue ends or a write fails.
///
/// A failed write marks the outbox closed so broadcasters skip it from then
/// on; removing the session is left to the connection's own close handling.
///
/// # Errors
///
/// Returns the first write error.
pub async fn run_writer<S: FrameSink>(
    mut receiver: OutboxReceiver,
    mut sink: S,
) -> Result<(), TransportError> {
    while let Some(frame) = receiver.recv().await {
        trace!(bytes = frame.len(), "Writing frame");
        if let Err(e) = sink.send_text(&frame).await {
            debug!(error = %e, "Writer stopped");
            receiver.close();
            return Err(e);
        }
    }

    debug!("Outbox drained, closing sink");
    sink.close().await
}
