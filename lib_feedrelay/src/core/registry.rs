//! # Connection Registry
//!
//! Live sessions keyed by session id. Connection tasks register and
//! unregister independently of each other and of the delivery cycle, so every
//! operation takes the lock briefly and never holds it across an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::core::session::SessionHandle;
use crate::errors::{RelayError, RelayResult};

/// Thread-safe map of session id to [`SessionHandle`].
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        // A poisoned map is still a consistent map; every write is a single insert or remove.
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Adds a session. An existing entry with the same id is replaced and returned.
    pub fn register(&self, handle: SessionHandle) -> Option<SessionHandle> {
        let id = handle.id().to_string();
        let replaced = self.sessions().insert(id.clone(), handle);
        tracing::debug!(session = %id, "session registered");
        replaced
    }

    /// Removes a session. Unknown ids are ignored.
    pub fn unregister(&self, id: &str) -> Option<SessionHandle> {
        let removed = self.sessions().remove(id);
        if removed.is_some() {
            tracing::debug!(session = %id, "session unregistered");
        }
        removed
    }

    /// Looks up a session for a targeted send.
    pub fn lookup(&self, id: &str) -> RelayResult<SessionHandle> {
        self.sessions()
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::Addressing(id.to_string()))
    }

    /// Every live session, oldest registration first.
    pub fn snapshot_all(&self) -> Vec<SessionHandle> {
        let mut all: Vec<SessionHandle> = self.sessions().values().cloned().collect();
        all.sort_by_key(SessionHandle::seq);
        all
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    /// Whether no session is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}
