//! Waiting queue for video-call matchmaking.
//!
//! Invariant: a user appears at most once, regardless of how many times they
//! ask to join. All operations return booleans — a duplicate join or a leave
//! by someone who never queued is harmless, not an error.

use parking_lot::Mutex;
use std::sync::Arc;

/// A (user, connection) pair awaiting pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub user_id: String,
    pub connection_id: String,
}

#[derive(Clone, Default)]
pub struct MatchQueue {
    entries: Arc<Mutex<Vec<QueueEntry>>>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to the queue. Returns false if the user is already queued
    /// (duplicate joins are idempotent — a client may retry).
    pub fn enqueue(&self, user_id: &str, connection_id: &str) -> bool {
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.user_id == user_id) {
            return false;
        }
        entries.push(QueueEntry {
            user_id: user_id.to_string(),
            connection_id: connection_id.to_string(),
        });
        true
    }

    /// Remove a user's entry. Returns false if the user wasn't queued.
    pub fn dequeue(&self, user_id: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.user_id != user_id);
        entries.len() < before
    }

    /// Remove the entry owned by a specific connection. Used by disconnect
    /// cleanup, where only the connection id is known; a stale connection id
    /// (user rejoined from a newer session) matches nothing.
    pub fn remove_connection(&self, connection_id: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.connection_id != connection_id);
        entries.len() < before
    }

    /// Atomically re-verify that both users are still queued and remove them.
    /// Returns false without removing anything if either vanished — the match
    /// engine's guard against a leave racing the pairing round.
    pub fn remove_pair(&self, user_a: &str, user_b: &str) -> bool {
        let mut entries = self.entries.lock();
        let has_a = entries.iter().any(|e| e.user_id == user_a);
        let has_b = entries.iter().any(|e| e.user_id == user_b);
        if !(has_a && has_b) {
            return false;
        }
        entries.retain(|e| e.user_id != user_a && e.user_id != user_b);
        true
    }

    /// Put an entry back, e.g. after call-record persistence failed.
    /// Keeps the uniqueness invariant.
    pub fn restore(&self, entry: QueueEntry) -> bool {
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.user_id == entry.user_id) {
            return false;
        }
        entries.push(entry);
        true
    }

    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.lock().clone()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.lock().iter().any(|e| e.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
