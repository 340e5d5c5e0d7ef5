//! Bounded per-connection outbound queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// A pre-encoded outbound frame, shared between all recipients of a broadcast.
pub type EncodedFrame = Arc<str>;

/// Reasons a push into an outbox can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// The queue is at capacity; the frame was dropped.
    #[error("Outbox full")]
    Full,

    /// The connection's writer has stopped.
    #[error("Outbox closed")]
    Closed,
}

/// Create a connected outbox pair with the given queue capacity.
#[must_use]
pub fn outbox(capacity: usize) -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let open = Arc::new(AtomicBool::new(true));
    (
        Outbox {
            tx,
            open: Arc::clone(&open),
        },
        OutboxReceiver { rx, open },
    )
}

/// Sending half of a connection's outbound queue.
///
/// Cloning is cheap; all clones feed the same queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<EncodedFrame>,
    open: Arc<AtomicBool>,
}

impl Outbox {
    /// Check whether the connection still accepts frames.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Enqueue a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] if the queue is at capacity and
    /// [`PushError::Closed`] if the writer has gone away.
    pub fn push(&self, frame: EncodedFrame) -> Result<(), PushError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(PushError::Closed);
        }

        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => {
                self.open.store(false, Ordering::Release);
                PushError::Closed
            }
        })
    }
}

/// Receiving half of a connection's outbound queue, owned by its writer.
#[derive(Debug)]
pub struct OutboxReceiver {
    rx: mpsc::Receiver<EncodedFrame>,
    open: Arc<AtomicBool>,
}

impl OutboxReceiver {
    /// Wait for the next frame.
    ///
    /// Returns `None` once every [`Outbox`] clone has been dropped and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<EncodedFrame> {
        self.rx.recv().await
    }

    /// Mark the connection closed; further pushes fail with
    /// [`PushError::Closed`].
    pub fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        self.rx.close();
    }

    /// Drain everything queued so far.
    pub fn drain(&mut self) -> Vec<EncodedFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

impl Drop for OutboxReceiver {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}
