//! Read-only catalog of connected users and recent messages.
//!
//! The catalog mirrors hub state through [`PresenceHook`] and backs the REST
//! API. It never feeds anything back into the hub.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parley_core::{ChatMessage, PresenceHook, RosterEntry};
use parley_protocol::format_timestamp;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// A connected user as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogUser {
    pub id: u64,
    pub username: String,
    pub status: &'static str,
}

/// Connected users, keyed by session id.
#[derive(Debug, Default)]
pub struct UserCatalog {
    users: DashMap<u64, CatalogUser>,
}

impl UserCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog contents with `roster`.
    pub fn replace(&self, roster: &[RosterEntry]) {
        self.users
            .retain(|id, _| roster.iter().any(|entry| entry.id.get() == *id));

        for entry in roster {
            self.users.entry(entry.id.get()).or_insert_with(|| CatalogUser {
                id: entry.id.get(),
                username: entry.username.clone(),
                status: "online",
            });
        }
    }

    /// All users, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<CatalogUser> {
        let mut users: Vec<_> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    /// Look up one user.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<CatalogUser> {
        self.users.get(&id).map(|u| u.value().clone())
    }

    /// Number of users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if no users are connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// A message kept in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: u64,
    pub user_id: u64,
    pub username: String,
    pub text: String,
    pub timestamp: String,
}

/// Bounded in-memory message history.
#[derive(Debug)]
pub struct MessageHistory {
    limit: usize,
    next_id: AtomicU64,
    entries: RwLock<VecDeque<HistoryEntry>>,
}

impl MessageHistory {
    /// Create a history holding at most `limit` messages.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            next_id: AtomicU64::new(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    /// Append a message, evicting the oldest when full.
    pub fn push(&self, user_id: u64, username: &str, text: &str, at: DateTime<Utc>) -> HistoryEntry {
        let entry = HistoryEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            user_id,
            username: username.to_string(),
            text: text.to_string(),
            timestamp: format_timestamp(at),
        };

        if self.limit == 0 {
            return entry;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.limit {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        entry
    }

    /// All retained messages, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<HistoryEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// The last `limit` messages, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Number of retained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Users and messages, kept in sync with the hub.
#[derive(Debug)]
pub struct Catalog {
    pub users: UserCatalog,
    pub messages: MessageHistory,
}

impl Catalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            users: UserCatalog::new(),
            messages: MessageHistory::new(history_limit),
        }
    }
}

impl PresenceHook for Catalog {
    fn roster_changed(&self, roster: &[RosterEntry]) {
        self.users.replace(roster);
    }

    fn message_sent(&self, message: &ChatMessage) {
        self.messages.push(
            message.sender_id.get(),
            &message.sender_name,
            &message.text,
            message.sent_at,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::SessionId;

    fn roster(names: &[(u64, &str)]) -> Vec<RosterEntry> {
        names
            .iter()
            .map(|(id, name)| RosterEntry {
                id: SessionId(*id),
                username: name.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_users_follow_roster() {
        let catalog = UserCatalog::new();

        catalog.replace(&roster(&[(2, "bob"), (1, "alice")]));
        let users = catalog.list();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].username, "alice");
        assert_eq!(users[0].status, "online");

        catalog.replace(&roster(&[(2, "bob")]));
        assert!(catalog.get(1).is_none());
        assert_eq!(catalog.get(2).unwrap().username, "bob");

        catalog.replace(&[]);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let history = MessageHistory::new(3);
        for i in 0..5 {
            history.push(1, "alice", &format!("m{i}"), Utc::now());
        }

        let texts: Vec<_> = history.all().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
        assert_eq!(history.all()[0].id, 3);
    }

    #[test]
    fn test_recent() {
        let history = MessageHistory::new(100);
        for i in 0..5 {
            history.push(1, "alice", &format!("m{i}"), Utc::now());
        }

        let texts: Vec<_> = history.recent(2).into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["m3", "m4"]);
        assert_eq!(history.recent(50).len(), 5);
        assert!(history.recent(0).is_empty());
    }

    #[test]
    fn test_history_entry_shape() {
        let history = MessageHistory::new(10);
        let entry = history.push(7, "carol", "hey", Utc::now());

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["userId"], 7);
        assert_eq!(json["username"], "carol");
        assert_eq!(json["text"], "hey");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_catalog_as_presence_hook() {
        let catalog = Catalog::new(10);
        let message = ChatMessage::new(SessionId(1), "alice", "hi");

        catalog.roster_changed(&roster(&[(1, "alice")]));
        catalog.message_sent(&message);

        assert_eq!(catalog.users.len(), 1);
        assert_eq!(catalog.messages.all()[0].text, "hi");
    }
}
