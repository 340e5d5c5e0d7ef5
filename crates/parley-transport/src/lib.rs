//! # parley-transport
//!
//! Outbound delivery plumbing for the Parley chat relay.
//!
//! Every connection owns an [`Outbox`]: a bounded FIFO queue plus an "open"
//! flag. The hub pushes pre-encoded frames into outboxes without ever
//! awaiting, and a dedicated writer task per connection drains the queue
//! into the socket through the [`FrameSink`] trait.
//!
//! ```rust,ignore
//! use parley_transport::{outbox, run_writer};
//!
//! let (outbox, receiver) = outbox(256);
//! tokio::spawn(run_writer(receiver, sink));
//! outbox.push("{\"type\":\"welcome\"}".into())?;
//! ```

pub mod outbox;
pub mod traits;
pub mod writer;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use outbox::{outbox, Outbox, OutboxReceiver, PushError};
pub use traits::{FrameSink, TransportError};
pub use writer::run_writer;
