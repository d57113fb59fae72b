//! Connection registry: the source of truth for "is user X reachable right
//! now, and through which connection."
//!
//! Holds a forward map (user id -> live session) and a reverse index
//! (connection id -> user id) so disconnect cleanup is O(1) instead of a
//! scan-by-value. Single-session semantics: a second join from another
//! device replaces the entry, and the evicted session is returned to the
//! caller so it can be closed.

use dashmap::DashMap;
use std::sync::Arc;

use crate::ws::ConnectionSender;

/// One live, authenticated WebSocket session.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: String,
    pub sender: ConnectionSender,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    forward: Arc<DashMap<String, Session>>,
    reverse: Arc<DashMap<String, String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) the mapping for a user. Last join wins:
    /// any previous session for the same user is evicted and returned so
    /// the caller can force-close it.
    pub fn bind(
        &self,
        user_id: &str,
        connection_id: &str,
        sender: ConnectionSender,
    ) -> Option<Session> {
        self.reverse
            .insert(connection_id.to_string(), user_id.to_string());
        let previous = self.forward.insert(
            user_id.to_string(),
            Session {
                connection_id: connection_id.to_string(),
                sender,
            },
        );
        if let Some(prev) = &previous {
            self.reverse.remove(&prev.connection_id);
        }
        previous
    }

    /// Remove the mapping owned by this connection id. Returns the user id
    /// if this connection was still the user's current session. A stale
    /// connection (already replaced by a newer join) is a no-op.
    pub fn unbind(&self, connection_id: &str) -> Option<String> {
        let (_, user_id) = self.reverse.remove(connection_id)?;
        let still_current = self
            .forward
            .get(&user_id)
            .map(|s| s.connection_id == connection_id)
            .unwrap_or(false);
        if still_current {
            self.forward.remove(&user_id);
            Some(user_id)
        } else {
            None
        }
    }

    /// Look up a user's current session. Absence means "cannot reach this
    /// user right now" — never an error.
    pub fn resolve(&self, user_id: &str) -> Option<Session> {
        self.forward.get(user_id).map(|s| s.clone())
    }

    pub fn is_bound(&self, user_id: &str) -> bool {
        self.forward.contains_key(user_id)
    }

    /// Snapshot of all bound sessions, for best-effort fan-out.
    pub fn sessions(&self) -> Vec<(String, Session)> {
        self.forward
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
