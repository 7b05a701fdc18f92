//! Session registry enforcing at most one active session per user

use crate::errors::{GameError, GameResult};
use crate::types::{Session, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

pub struct SessionRegistry {
    sessions: DashMap<UserId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Insert a new session for `user_id` if none exists.
    ///
    /// `init` runs while the entry is held, so the caller can reserve the
    /// stake in the same per-user critical section: the session only becomes
    /// visible if the reservation succeeded, and two racing starts cannot
    /// both pass.
    pub fn create_with<F>(&self, user_id: UserId, init: F) -> GameResult<Arc<Session>>
    where
        F: FnOnce() -> GameResult<Session>,
    {
        match self.sessions.entry(user_id) {
            Entry::Occupied(_) => Err(GameError::ConcurrentSessionExists),
            Entry::Vacant(entry) => {
                let session = Arc::new(init()?);
                entry.insert(Arc::clone(&session));
                debug!(user_id, stake = session.stake(), "Session created");
                Ok(session)
            }
        }
    }

    pub fn get(&self, user_id: UserId) -> Option<Arc<Session>> {
        self.sessions.get(&user_id).map(|e| Arc::clone(e.value()))
    }

    /// Idempotent removal.
    pub fn remove(&self, user_id: UserId) {
        if self.sessions.remove(&user_id).is_some() {
            debug!(user_id, "Session removed");
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
