//! Presence hook.
//!
//! Collaborators that mirror hub state (for example a read-only user catalog)
//! implement [`PresenceHook`]. The hub works the same with or without one.

use crate::message::ChatMessage;
use crate::registry::RosterEntry;

/// Receives roster and message notifications from the hub.
///
/// Calls happen on connection tasks, outside the registry lock, so
/// implementations should be quick and must not call back into the hub.
pub trait PresenceHook: Send + Sync {
    /// Called after every registry mutation with the roster as it stands.
    ///
    /// Calls never overlap and arrive in mutation order, so the last roster
    /// seen is always current.
    fn roster_changed(&self, roster: &[RosterEntry]);

    /// Called for every chat message accepted by the hub.
    fn message_sent(&self, _message: &ChatMessage) {}
}
