//! The session hub.
//!
//! The hub owns the [`Registry`], drives each connection through the
//! `AwaitingName -> Active -> Closed` protocol and fans frames out to the
//! sessions' outboxes. Chat messages are also handed to the [`Publisher`]
//! for the durable queue; the hub never waits on the broker.
//!
//! All hub methods are synchronous. Connection tasks call them directly and
//! the per-connection writer tasks do the actual socket I/O.

use crate::broker::{Broker, Publisher};
use crate::message::ChatMessage;
use crate::presence::PresenceHook;
use crate::registry::{NameRejection, Registry, Removal, RosterEntry};
use crate::session::{ConnectionState, SessionId};
use chrono::Utc;
use parley_protocol::codec::{self, MAX_FRAME_SIZE};
use parley_protocol::{ClientFrame, ProtocolError, ServerFrame, UserSummary};
use parley_transport::{outbox, Outbox, OutboxReceiver, PushError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const MALFORMED_FRAME: &str = "Could not process your message.";
const FRAME_TOO_LARGE: &str = "Message too large.";
const NAME_REQUIRED: &str = "You must set a username first.";

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames each connection may have queued before new ones are dropped.
    pub outbox_capacity: usize,
    /// Chat messages waiting for the broker before new ones are dropped.
    pub broker_backlog: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            broker_backlog: 1024,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// What the hub did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The session is closed; the frame was dropped.
    Ignored,
    /// The frame could not be decoded.
    Malformed,
    /// The frame exceeded the size limit.
    TooLarge,
    /// A display name was claimed.
    NameAccepted(String),
    /// A name claim was refused.
    NameRejected(NameRejection),
    /// A chat message was broadcast to this many sessions.
    Broadcast(usize),
    /// Chat was attempted before a name was claimed.
    NameRequired,
    /// The roster was sent to the requester.
    Listed,
}

/// The central session hub.
pub struct Hub {
    registry: Registry,
    // Held across a roster mutation and its hook call, so hooks see
    // snapshots in mutation order.
    roster_changes: Mutex<()>,
    publisher: Publisher,
    presence: Option<Arc<dyn PresenceHook>>,
    config: HubConfig,
}

impl Hub {
    /// Create a hub publishing chat messages to `broker`.
    ///
    /// Must be called inside a tokio runtime; the broker publisher runs as a
    /// background task.
    #[must_use]
    pub fn new(config: HubConfig, broker: Arc<dyn Broker>) -> Self {
        info!("Creating hub with config: {:?}", config);
        Self {
            registry: Registry::new(),
            roster_changes: Mutex::new(()),
            publisher: Publisher::spawn(broker, config.broker_backlog),
            presence: None,
            config,
        }
    }

    /// Attach a hook that mirrors roster changes and chat messages.
    #[must_use]
    pub fn with_presence_hook(mut self, hook: Arc<dyn PresenceHook>) -> Self {
        self.presence = Some(hook);
        self
    }

    /// Register a new connection and greet it.
    ///
    /// Returns the session id and the receiving end of its outbox, which the
    /// caller hands to a writer task.
    pub fn connect(&self) -> (SessionId, OutboxReceiver) {
        let (tx, rx) = outbox(self.config.outbox_capacity);

        let changes = self.lock_roster_changes();
        let id = self.registry.register(tx, greet);
        self.notify_roster();
        drop(changes);

        info!(connection = %id, "Client connected");
        (id, rx)
    }

    /// Decode and handle one raw inbound frame.
    pub fn handle_inbound(&self, id: SessionId, data: &[u8]) -> FrameOutcome {
        if self.registry.state(id) == ConnectionState::Closed {
            debug!(connection = %id, "Frame for closed session ignored");
            return FrameOutcome::Ignored;
        }

        match codec::decode_with_limit(data, self.config.max_frame_size) {
            Ok(frame) => self.handle_frame(id, frame),
            Err(ProtocolError::FrameTooLarge { size, max }) => {
                debug!(connection = %id, size, max, "Frame too large");
                self.send_to(id, &ServerFrame::error(FRAME_TOO_LARGE));
                FrameOutcome::TooLarge
            }
            Err(e) => {
                debug!(connection = %id, error = %e, "Malformed frame");
                self.send_to(id, &ServerFrame::error(MALFORMED_FRAME));
                FrameOutcome::Malformed
            }
        }
    }

    /// Handle one decoded client frame.
    pub fn handle_frame(&self, id: SessionId, frame: ClientFrame) -> FrameOutcome {
        match (self.registry.state(id), frame) {
            (ConnectionState::Closed | ConnectionState::Connecting, _) => {
                debug!(connection = %id, "Frame for closed session ignored");
                FrameOutcome::Ignored
            }
            (_, ClientFrame::SetUsername { username }) => self.claim(id, &username),
            (ConnectionState::Active, ClientFrame::Message { message }) => self.chat(id, message),
            (ConnectionState::AwaitingName, ClientFrame::Message { .. }) => {
                debug!(connection = %id, "Chat before name claimed");
                self.send_to(id, &ServerFrame::error(NAME_REQUIRED));
                FrameOutcome::NameRequired
            }
            (_, ClientFrame::ListUsers) => {
                self.send_to(id, &self.user_list_frame());
                FrameOutcome::Listed
            }
        }
    }

    /// Remove a connection. Calling this more than once has no further effect.
    pub fn disconnect(&self, id: SessionId) -> Removal {
        let changes = self.lock_roster_changes();
        let removal = self.registry.unregister(id);
        if !removal.removed() {
            return removal;
        }

        self.notify_roster();
        drop(changes);

        match &removal {
            Removal::Named(name) => {
                info!(connection = %id, username = %name, "User left");
                self.broadcast(&ServerFrame::user_left(name.as_str(), Utc::now()), None);
                self.broadcast(&self.user_list_frame(), None);
            }
            _ => info!(connection = %id, "Client disconnected"),
        }

        removal
    }

    /// Protocol state of a connection.
    #[must_use]
    pub fn state(&self, id: SessionId) -> ConnectionState {
        self.registry.state(id)
    }

    /// Named sessions, oldest first.
    #[must_use]
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.registry.roster()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Flush pending broker entries, waiting at most `flush_timeout`.
    pub async fn shutdown(&self, flush_timeout: Duration) {
        info!(sessions = self.registry.len(), "Shutting down hub");
        self.publisher.shutdown(flush_timeout).await;
    }

    fn claim(&self, id: SessionId, candidate: &str) -> FrameOutcome {
        let candidate = candidate.trim();

        let changes = self.lock_roster_changes();
        if let Err(rejection) = self.registry.claim_name(id, candidate) {
            drop(changes);
            debug!(connection = %id, reason = rejection.reason(), "Name rejected");
            self.send_to(id, &ServerFrame::error(rejection.to_string()));
            return FrameOutcome::NameRejected(rejection);
        }
        self.notify_roster();
        drop(changes);

        info!(connection = %id, username = %candidate, "User joined");

        self.send_to(id, &ServerFrame::username_accepted(candidate));
        self.broadcast(&ServerFrame::user_joined(candidate, Utc::now()), Some(id));
        self.broadcast(&self.user_list_frame(), None);

        FrameOutcome::NameAccepted(candidate.to_string())
    }

    fn chat(&self, id: SessionId, text: String) -> FrameOutcome {
        // The sender may have gone between the state check and here.
        let Some(Some(name)) = self.registry.display_name(id) else {
            return FrameOutcome::Ignored;
        };

        let message = ChatMessage::new(id, name, text);
        if let Some(hook) = &self.presence {
            hook.message_sent(&message);
        }

        let delivered = self.broadcast(&message.to_frame(), None);
        self.publisher.submit(message.to_entry());

        debug!(connection = %id, delivered, "Message broadcast");
        FrameOutcome::Broadcast(delivered)
    }

    fn user_list_frame(&self) -> ServerFrame {
        ServerFrame::user_list(
            self.registry
                .roster()
                .into_iter()
                .map(|entry| UserSummary {
                    id: entry.id.get(),
                    username: entry.username,
                })
                .collect(),
        )
    }

    fn lock_roster_changes(&self) -> MutexGuard<'_, ()> {
        self.roster_changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_roster(&self) {
        if let Some(hook) = &self.presence {
            hook.roster_changed(&self.registry.roster());
        }
    }

    fn send_to(&self, id: SessionId, frame: &ServerFrame) {
        let Some(outbox) = self.registry.outbox(id) else {
            return;
        };

        let encoded = match codec::encode(frame) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(kind = frame.kind(), error = %e, "Failed to encode frame");
                return;
            }
        };

        if let Err(e) = outbox.push(encoded) {
            warn!(connection = %id, kind = frame.kind(), error = %e, "Dropped frame");
        }
    }

    /// Push `frame` to every registered session except `exclude`.
    ///
    /// Returns the number of outboxes that accepted the frame.
    fn broadcast(&self, frame: &ServerFrame, exclude: Option<SessionId>) -> usize {
        let encoded = match codec::encode(frame) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(kind = frame.kind(), error = %e, "Failed to encode frame");
                return 0;
            }
        };

        let mut delivered = 0;
        for (id, outbox) in self.registry.recipients() {
            if Some(id) == exclude || !outbox.is_open() {
                continue;
            }

            match outbox.push(Arc::clone(&encoded)) {
                Ok(()) => delivered += 1,
                Err(PushError::Full) => {
                    warn!(connection = %id, kind = frame.kind(), "Outbox full, frame dropped");
                }
                Err(PushError::Closed) => {
                    debug!(connection = %id, kind = frame.kind(), "Outbox closed, frame skipped");
                }
            }
        }

        trace!(kind = frame.kind(), delivered, "Broadcast");
        delivered
    }
}

/// Push the welcome frame into a fresh outbox.
fn greet(id: SessionId, outbox: &Outbox) {
    match codec::encode(&ServerFrame::welcome(id.get())) {
        Ok(encoded) => {
            if let Err(e) = outbox.push(encoded) {
                warn!(connection = %id, error = %e, "Dropped welcome");
            }
        }
        Err(e) => error!(connection = %id, error = %e, "Failed to encode welcome"),
    }
}
