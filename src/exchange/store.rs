//! Process-wide session store.
//!
//! Maps session identifiers to [`Session`] metadata so the facade can
//! route each `ask` to the manager that owns the session. The store is an
//! explicit value owned by the facade, not a global, so independent
//! exchanges can coexist in one process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::session::{ChannelKind, Session};

/// Result of a deactivation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deactivation {
    /// The session was active and is now stopped.
    Deactivated(ChannelKind),
    /// The session had already been stopped.
    AlreadyInactive,
    /// No session with that id.
    Unknown,
}

/// Thread-safe map of sessions keyed by session id.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a session.
    pub async fn insert(&self, session: Session) {
        self.inner.lock().await.insert(session.id.clone(), session);
    }

    /// Snapshot of a session by id.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.inner.lock().await.get(session_id).cloned()
    }

    /// Owning channel of an active session; `None` when unknown or stopped.
    pub async fn active_channel(&self, session_id: &str) -> Option<ChannelKind> {
        self.inner
            .lock()
            .await
            .get(session_id)
            .filter(|session| session.is_active)
            .map(|session| session.channel)
    }

    /// Flip a session's `is_active` flag to `false`.
    pub async fn deactivate(&self, session_id: &str) -> Deactivation {
        let mut guard = self.inner.lock().await;
        match guard.get_mut(session_id) {
            None => Deactivation::Unknown,
            Some(session) => {
                if session.deactivate() {
                    Deactivation::Deactivated(session.channel)
                } else {
                    Deactivation::AlreadyInactive
                }
            }
        }
    }

    /// Remove a session entry entirely.
    pub async fn remove(&self, session_id: &str) -> Option<Session> {
        self.inner.lock().await.remove(session_id)
    }

    /// Ids of all active sessions on a channel.
    pub async fn active_ids(&self, channel: ChannelKind) -> Vec<String> {
        self.inner
            .lock()
            .await
            .values()
            .filter(|session| session.is_active && session.channel == channel)
            .map(|session| session.id.clone())
            .collect()
    }

    /// Number of tracked sessions, active or not.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether the store tracks no sessions.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
