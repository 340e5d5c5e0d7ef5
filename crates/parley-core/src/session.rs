//! Session types.

use parley_transport::Outbox;
use std::fmt;

/// Identifier of a live connection.
///
/// Allocated in increasing order and never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Get the raw numeric id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Accepted but not yet registered.
    Connecting,
    /// Registered without a display name.
    AwaitingName,
    /// Registered with a display name; may chat.
    Active,
    /// Removed from the registry.
    Closed,
}

/// Server-side state of one live connection.
#[derive(Debug, Clone)]
pub struct Session {
    /// Connection identifier.
    pub id: SessionId,
    /// Claimed display name, if any.
    pub display_name: Option<String>,
    /// Outbound queue to this client.
    pub outbox: Outbox,
}

impl Session {
    /// Create a new unnamed session.
    #[must_use]
    pub fn new(id: SessionId, outbox: Outbox) -> Self {
        Self {
            id,
            display_name: None,
            outbox,
        }
    }

    /// Get the protocol state implied by this session.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.display_name.is_some() {
            ConnectionState::Active
        } else {
            ConnectionState::AwaitingName
        }
    }
}
