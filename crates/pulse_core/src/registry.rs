//! crates/pulse_core/src/registry.rs
//!
//! In-memory map of which sessions each user currently has open.
//!
//! The registry does no locking and no I/O. The owner (see `hub.rs`) is expected
//! to serialize access to it.

use std::collections::{HashMap, HashSet};

use crate::domain::{SessionId, UserId};

/// Transitions produced by `SessionRegistry::add_session`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    /// The session is the user's first live session.
    pub first_session: bool,
    /// The session used to belong to this other user, and it was their last one.
    pub previous_owner_left: Option<UserId>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    by_user: HashMap<UserId, HashSet<SessionId>>,
    owners: HashMap<SessionId, UserId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `session_id` to `user`'s set. Re-adding a known session is a no-op.
    ///
    /// A session that was registered under a different user is moved, and the
    /// result reports whether the previous owner lost their last session.
    pub fn add_session(&mut self, user: &UserId, session_id: SessionId) -> Registration {
        let mut registration = Registration::default();

        match self.owners.get(&session_id) {
            Some(owner) if owner == user => return registration,
            Some(_) => {
                registration.previous_owner_left = self.remove_session(session_id);
            }
            None => {}
        }

        let sessions = self.by_user.entry(user.clone()).or_default();
        registration.first_session = sessions.is_empty();
        sessions.insert(session_id);
        self.owners.insert(session_id, user.clone());
        registration
    }

    /// Removes the session. Returns the owning user only when this emptied
    /// their set; unknown sessions and non-final removals return `None`.
    pub fn remove_session(&mut self, session_id: SessionId) -> Option<UserId> {
        let owner = self.owners.remove(&session_id)?;
        let sessions = self.by_user.get_mut(&owner)?;
        sessions.remove(&session_id);
        if sessions.is_empty() {
            self.by_user.remove(&owner);
            Some(owner)
        } else {
            None
        }
    }

    pub fn sessions_for(&self, user: &UserId) -> HashSet<SessionId> {
        self.by_user.get(user).cloned().unwrap_or_default()
    }

    pub fn owner_of(&self, session_id: SessionId) -> Option<&UserId> {
        self.owners.get(&session_id)
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.by_user.contains_key(user)
    }

    pub fn session_count(&self, user: &UserId) -> usize {
        self.by_user.get(user).map_or(0, HashSet::len)
    }

    /// Forgets every session and returns the users that were online, sorted.
    pub fn drain(&mut self) -> Vec<UserId> {
        self.owners.clear();
        let mut users: Vec<UserId> = self.by_user.drain().map(|(user, _)| user).collect();
        users.sort();
        users
    }
}
