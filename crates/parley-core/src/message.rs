//! Chat message domain event.
//!
//! A [`ChatMessage`] is always assembled by the hub from registry state plus
//! the payload text; nothing about the sender comes from the client frame.

use crate::session::SessionId;
use chrono::{DateTime, Utc};
use parley_protocol::{format_timestamp, BrokerEntry, ServerFrame};

/// A chat message sent by a named session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Sending session.
    pub sender_id: SessionId,
    /// Sender display name at send time.
    pub sender_name: String,
    /// Message text.
    pub text: String,
    /// When the hub accepted the message.
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a new message stamped with the current time.
    #[must_use]
    pub fn new(sender_id: SessionId, sender_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id,
            sender_name: sender_name.into(),
            text: text.into(),
            sent_at: Utc::now(),
        }
    }

    /// Get the formatted send time.
    #[must_use]
    pub fn timestamp(&self) -> String {
        format_timestamp(self.sent_at)
    }

    /// The broadcast frame for this message.
    #[must_use]
    pub fn to_frame(&self) -> ServerFrame {
        ServerFrame::Message {
            username: self.sender_name.clone(),
            user_id: self.sender_id.get(),
            message: self.text.clone(),
            timestamp: self.timestamp(),
        }
    }

    /// The durable queue record for this message.
    #[must_use]
    pub fn to_entry(&self) -> BrokerEntry {
        BrokerEntry {
            username: self.sender_name.clone(),
            user_id: self.sender_id.get(),
            message: self.text.clone(),
            timestamp: self.timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_and_entry_agree() {
        let msg = ChatMessage::new(SessionId(4), "alice", "hi");
        let entry = msg.to_entry();

        match msg.to_frame() {
            ServerFrame::Message {
                username,
                user_id,
                message,
                timestamp,
            } => {
                assert_eq!(username, entry.username);
                assert_eq!(user_id, entry.user_id);
                assert_eq!(message, entry.message);
                assert_eq!(timestamp, entry.timestamp);
            }
            other => panic!("Expected message frame, got {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_has_millis_and_zulu() {
        let msg = ChatMessage::new(SessionId(1), "bob", "yo");
        let ts = msg.timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-05-01T12:00:00.000Z".len());
    }
}
