//! Tracking of which uploads belong to which client session.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

/// Maps session ids to the storage names of the uploads they created.
///
/// Each method is a single atomic step; in particular [`take`](Self::take)
/// removes the session and returns its files in one operation so that an
/// upload racing a cleanup is either cleaned or kept, never half-tracked.
pub trait SessionStore: Send + Sync {
    /// Record `storage_name` under `session_id`, creating the session if needed.
    fn track(&self, session_id: &str, storage_name: &str);

    /// Remove the session, returning every storage name it tracked.
    fn take(&self, session_id: &str) -> Vec<String>;

    /// Storage names currently tracked for `session_id`.
    fn files(&self, session_id: &str) -> Vec<String>;

    /// Stop tracking the given storage names in every session, dropping
    /// sessions left empty.
    fn forget(&self, storage_names: &HashSet<String>);
}

/// Process-local session store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, HashSet<String>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl SessionStore for InMemorySessionStore {
    fn track(&self, session_id: &str, storage_name: &str) {
        self.sessions
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .insert(storage_name.to_string());
    }

    fn take(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .lock()
            .remove(session_id)
            .map(|files| files.into_iter().collect())
            .unwrap_or_default()
    }

    fn files(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn forget(&self, storage_names: &HashSet<String>) {
        if storage_names.is_empty() {
            return;
        }
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, files| {
            files.retain(|name| !storage_names.contains(name));
            !files.is_empty()
        });
    }
}
