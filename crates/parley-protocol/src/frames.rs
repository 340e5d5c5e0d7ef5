//! Frame types for the Parley protocol.
//!
//! Frames are JSON objects tagged by a `type` field. Inbound and outbound
//! frames are separate enums so the server can never accidentally accept a
//! server-only frame from a client.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Format a timestamp the way clients expect it (`2024-05-01T12:00:00.000Z`).
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A frame sent by a client.
///
/// Fields a client adds beyond the ones listed here (for example a forged
/// `userId`) are ignored during decoding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Claim a display name.
    #[serde(rename = "setUsername")]
    SetUsername {
        /// Requested name; surrounding whitespace is trimmed by the hub.
        username: String,
    },

    /// Send a chat message.
    #[serde(rename = "message")]
    Message {
        /// Chat text.
        message: String,
    },

    /// Request the current roster.
    #[serde(rename = "listUsers")]
    ListUsers,
}

/// One roster row inside a `userList` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// Connection identifier of the user.
    pub id: u64,
    /// Claimed display name.
    pub username: String,
}

/// A frame sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Sent once, right after the connection is accepted.
    Welcome {
        /// Greeting text.
        message: String,
        /// Identifier assigned to this connection.
        #[serde(rename = "clientId")]
        client_id: u64,
    },

    /// The requested display name was bound to the connection.
    UsernameAccepted {
        /// The accepted name.
        username: String,
    },

    /// A request was rejected.
    Error {
        /// Human-readable reason.
        message: String,
    },

    /// A chat message, delivered to every session including the sender.
    Message {
        /// Sender display name.
        username: String,
        /// Sender connection identifier.
        #[serde(rename = "userId")]
        user_id: u64,
        /// Chat text.
        message: String,
        /// Server-side send time.
        timestamp: String,
    },

    /// Current roster.
    UserList {
        /// Named sessions, oldest first.
        users: Vec<UserSummary>,
        /// Number of entries in `users`.
        count: usize,
    },

    /// Someone claimed a name.
    UserJoined {
        /// The new user's name.
        username: String,
        /// Announcement text.
        message: String,
        /// Event time.
        timestamp: String,
    },

    /// A named session disconnected.
    UserLeft {
        /// The departed user's name.
        username: String,
        /// Announcement text.
        message: String,
        /// Event time.
        timestamp: String,
    },
}

impl ServerFrame {
    /// Get the wire name of this frame.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Welcome { .. } => "welcome",
            ServerFrame::UsernameAccepted { .. } => "usernameAccepted",
            ServerFrame::Error { .. } => "error",
            ServerFrame::Message { .. } => "message",
            ServerFrame::UserList { .. } => "userList",
            ServerFrame::UserJoined { .. } => "userJoined",
            ServerFrame::UserLeft { .. } => "userLeft",
        }
    }

    /// Create a new Welcome frame.
    #[must_use]
    pub fn welcome(client_id: u64) -> Self {
        ServerFrame::Welcome {
            message: "Welcome to the chat! Please choose a username.".to_string(),
            client_id,
        }
    }

    /// Create a new UsernameAccepted frame.
    #[must_use]
    pub fn username_accepted(username: impl Into<String>) -> Self {
        ServerFrame::UsernameAccepted {
            username: username.into(),
        }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }

    /// Create a new UserList frame.
    #[must_use]
    pub fn user_list(users: Vec<UserSummary>) -> Self {
        let count = users.len();
        ServerFrame::UserList { users, count }
    }

    /// Create a new UserJoined frame.
    #[must_use]
    pub fn user_joined(username: impl Into<String>, at: DateTime<Utc>) -> Self {
        let username = username.into();
        ServerFrame::UserJoined {
            message: format!("{username} joined the chat"),
            username,
            timestamp: format_timestamp(at),
        }
    }

    /// Create a new UserLeft frame.
    #[must_use]
    pub fn user_left(username: impl Into<String>, at: DateTime<Utc>) -> Self {
        let username = username.into();
        ServerFrame::UserLeft {
            message: format!("{username} left the chat"),
            username,
            timestamp: format_timestamp(at),
        }
    }
}
