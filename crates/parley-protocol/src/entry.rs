//! Durable queue record for chat messages.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A chat message as written to the durable queue.
///
/// Producers publish it as JSON bytes; the archiver decodes it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerEntry {
    /// Sender display name.
    pub username: String,
    /// Sender connection identifier.
    pub user_id: u64,
    /// Chat text.
    pub message: String,
    /// Send time, formatted like the `message` frame's timestamp.
    pub timestamp: String,
}

impl BrokerEntry {
    /// Serialize the entry to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Decode an entry from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid entry.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Render the entry as one archive log line, without the trailing newline.
    ///
    /// Line breaks and backslashes in the name and text are escaped, so one
    /// entry is always one line.
    #[must_use]
    pub fn log_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp,
            escape_line(&self.username),
            escape_line(&self.message)
        )
    }
}

fn escape_line(text: &str) -> Cow<'_, str> {
    if !text.contains(|c: char| matches!(c, '\\' | '\n' | '\r')) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
