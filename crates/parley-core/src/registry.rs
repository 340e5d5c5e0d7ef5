//! The session registry.
//!
//! The registry is the single source of truth for who is online and which
//! names are taken. Everything it stores sits behind one mutex, so each
//! public operation is atomic with respect to every other one; in particular
//! the name check and the name bind in [`Registry::claim_name`] can never be
//! split by a concurrent claim.

use crate::session::{ConnectionState, Session, SessionId};
use parley_transport::Outbox;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Minimum display name length, in characters.
pub const MIN_NAME_LENGTH: usize = 2;

/// Maximum display name length, in characters.
pub const MAX_NAME_LENGTH: usize = 20;

/// Why a name claim was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameRejection {
    /// Name is shorter than [`MIN_NAME_LENGTH`] or longer than [`MAX_NAME_LENGTH`].
    #[error("Username must be between {MIN_NAME_LENGTH} and {MAX_NAME_LENGTH} characters.")]
    InvalidLength,

    /// Another registered session holds the name.
    #[error("This username is already taken. Please choose another.")]
    NameTaken,

    /// The session already has a name.
    #[error("Your username is already set.")]
    AlreadyNamed,

    /// The session is no longer registered.
    #[error("Unknown session.")]
    UnknownSession,
}

impl NameRejection {
    /// Short machine-readable reason, for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            NameRejection::InvalidLength => "invalid_length",
            NameRejection::NameTaken => "name_taken",
            NameRejection::AlreadyNamed => "already_named",
            NameRejection::UnknownSession => "unknown_session",
        }
    }
}

/// Outcome of [`Registry::unregister`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The id was not registered (already removed or never added).
    NotRegistered,
    /// An unnamed session was removed.
    Unnamed,
    /// A named session was removed; its name is free again.
    Named(String),
}

impl Removal {
    /// The name released by this removal, if any.
    #[must_use]
    pub fn freed_name(self) -> Option<String> {
        match self {
            Removal::Named(name) => Some(name),
            Removal::NotRegistered | Removal::Unnamed => None,
        }
    }

    /// Whether a session was actually removed.
    #[must_use]
    pub fn removed(&self) -> bool {
        !matches!(self, Removal::NotRegistered)
    }
}

/// A point-in-time view of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Connection identifier.
    pub id: SessionId,
    /// Claimed display name, if any.
    pub display_name: Option<String>,
}

/// A named session, as shown in the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Connection identifier.
    pub id: SessionId,
    /// Display name.
    pub username: String,
}

#[derive(Debug)]
struct Inner {
    next_id: u64,
    // Ids grow monotonically, so key order is insertion order.
    sessions: BTreeMap<SessionId, Session>,
    names: HashMap<String, SessionId>,
}

/// In-memory table of live sessions.
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                sessions: BTreeMap::new(),
                names: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No critical section can leave the tables half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new, unnamed session and return its id.
    ///
    /// `greet` runs before the session becomes visible to
    /// [`recipients`](Self::recipients), so whatever it pushes is the first
    /// frame the connection sees.
    pub fn register(&self, outbox: Outbox, greet: impl FnOnce(SessionId, &Outbox)) -> SessionId {
        let mut inner = self.lock();
        let id = SessionId(inner.next_id);
        inner.next_id += 1;
        greet(id, &outbox);
        inner.sessions.insert(id, Session::new(id, outbox));
        debug!(connection = %id, sessions = inner.sessions.len(), "Session registered");
        id
    }

    /// Bind `candidate` as the display name of session `id`.
    ///
    /// # Errors
    ///
    /// Returns the first failed check: length, then uniqueness among
    /// registered sessions.
    pub fn claim_name(&self, id: SessionId, candidate: &str) -> Result<(), NameRejection> {
        let length = candidate.chars().count();
        if !(MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&length) {
            return Err(NameRejection::InvalidLength);
        }

        let mut inner = self.lock();
        let Inner {
            sessions, names, ..
        } = &mut *inner;

        let session = sessions.get_mut(&id).ok_or(NameRejection::UnknownSession)?;
        if session.display_name.is_some() {
            return Err(NameRejection::AlreadyNamed);
        }
        if names.contains_key(candidate) {
            return Err(NameRejection::NameTaken);
        }

        session.display_name = Some(candidate.to_string());
        names.insert(candidate.to_string(), id);
        debug!(connection = %id, username = %candidate, "Name claimed");
        Ok(())
    }

    /// Remove session `id`, releasing its name.
    pub fn unregister(&self, id: SessionId) -> Removal {
        let mut inner = self.lock();
        let Some(session) = inner.sessions.remove(&id) else {
            return Removal::NotRegistered;
        };

        debug!(connection = %id, sessions = inner.sessions.len(), "Session unregistered");
        match session.display_name {
            Some(name) => {
                inner.names.remove(&name);
                Removal::Named(name)
            }
            None => Removal::Unnamed,
        }
    }

    /// All sessions, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.lock()
            .sessions
            .values()
            .map(|s| SessionSnapshot {
                id: s.id,
                display_name: s.display_name.clone(),
            })
            .collect()
    }

    /// Named sessions, oldest first.
    #[must_use]
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.lock()
            .sessions
            .values()
            .filter_map(|s| {
                s.display_name.as_ref().map(|name| RosterEntry {
                    id: s.id,
                    username: name.clone(),
                })
            })
            .collect()
    }

    /// Outboxes of all registered sessions, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<Outbox> {
        self.lock()
            .sessions
            .values()
            .map(|s| s.outbox.clone())
            .collect()
    }

    /// Outboxes of all registered sessions paired with their ids.
    #[must_use]
    pub fn recipients(&self) -> Vec<(SessionId, Outbox)> {
        self.lock()
            .sessions
            .values()
            .map(|s| (s.id, s.outbox.clone()))
            .collect()
    }

    /// Outbox of one session.
    #[must_use]
    pub fn outbox(&self, id: SessionId) -> Option<Outbox> {
        self.lock().sessions.get(&id).map(|s| s.outbox.clone())
    }

    /// Display name of a session: `None` if it is not registered,
    /// `Some(None)` if it has not claimed a name yet.
    #[must_use]
    pub fn display_name(&self, id: SessionId) -> Option<Option<String>> {
        self.lock()
            .sessions
            .get(&id)
            .map(|s| s.display_name.clone())
    }

    /// Protocol state of a session.
    #[must_use]
    pub fn state(&self, id: SessionId) -> ConnectionState {
        self.lock()
            .sessions
            .get(&id)
            .map_or(ConnectionState::Closed, Session::state)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Check if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    /// Number of sessions holding a name.
    #[must_use]
    pub fn named_count(&self) -> usize {
        self.lock().names.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
