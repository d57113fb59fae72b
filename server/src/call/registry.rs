//! In-memory registry of active calls.
//!
//! Mirrors the persisted call records for fast signaling lookups while a
//! call is live. State machine: connecting -> connected -> ended, terminal;
//! an ended call leaves the registry entirely, so later lookups for its id
//! return absent.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use crate::call::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Connecting,
    Connected,
}

/// One participant's handle within an active call.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: String,
    pub connection_id: String,
}

#[derive(Debug, Clone)]
pub struct ActiveCall {
    pub call_id: String,
    pub participants: [Participant; 2],
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
}

impl ActiveCall {
    pub fn involves_user(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    pub fn involves_connection(&self, connection_id: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.connection_id == connection_id)
    }

    /// The other participant, given one side's user id.
    pub fn partner_of(&self, user_id: &str) -> Option<&Participant> {
        if !self.involves_user(user_id) {
            return None;
        }
        self.participants.iter().find(|p| p.user_id != user_id)
    }

    fn partner_of_connection(&self, connection_id: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id != connection_id)
    }
}

#[derive(Clone, Default)]
pub struct ActiveCallRegistry {
    calls: Arc<DashMap<String, ActiveCall>>,
}

impl ActiveCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, call: ActiveCall) {
        self.calls.insert(call.call_id.clone(), call);
    }

    pub fn get(&self, call_id: &str) -> Option<ActiveCall> {
        self.calls.get(call_id).map(|c| c.clone())
    }

    /// Find the call containing `from_user_id` and return the partner's
    /// handle for signaling relay. Absent when no active call involves the
    /// user. Linear scan — active call counts are small.
    pub fn lookup_partner(&self, from_user_id: &str) -> Option<(String, Participant)> {
        self.calls.iter().find_map(|entry| {
            entry
                .value()
                .partner_of(from_user_id)
                .map(|p| (entry.key().clone(), p.clone()))
        })
    }

    /// Transition connecting -> connected. Idempotent once connected;
    /// a missing call (including one already ended) signals CallNotFound.
    pub fn mark_connected(&self, call_id: &str) -> Result<(), CallError> {
        let mut call = self.calls.get_mut(call_id).ok_or(CallError::CallNotFound)?;
        call.status = CallStatus::Connected;
        Ok(())
    }

    /// Remove a call for an explicit end. Signals CallNotFound when the call
    /// doesn't exist or `user_id` isn't a participant.
    pub fn remove_for_end(&self, user_id: &str, call_id: &str) -> Result<ActiveCall, CallError> {
        self.calls
            .remove_if(call_id, |_, call| call.involves_user(user_id))
            .map(|(_, call)| call)
            .ok_or(CallError::CallNotFound)
    }

    /// Remove every call a connection participates in, returning each call
    /// with the surviving partner's handle. Used by disconnect cleanup.
    pub fn remove_calls_for_connection(
        &self,
        connection_id: &str,
    ) -> Vec<(ActiveCall, Participant)> {
        let ids: Vec<String> = self
            .calls
            .iter()
            .filter(|e| e.value().involves_connection(connection_id))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, call)) = self.calls.remove(&id) {
                if let Some(partner) = call.partner_of_connection(connection_id) {
                    let partner = partner.clone();
                    removed.push((call, partner));
                }
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(call_id: &str, a: &str, b: &str) -> ActiveCall {
        ActiveCall {
            call_id: call_id.to_string(),
            participants: [
                Participant {
                    user_id: a.to_string(),
                    connection_id: format!("conn-{a}"),
                },
                Participant {
                    user_id: b.to_string(),
                    connection_id: format!("conn-{b}"),
                },
            ],
            status: CallStatus::Connecting,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn lookup_partner_finds_other_side() {
        let registry = ActiveCallRegistry::new();
        registry.insert(call("c1", "alice", "bob"));

        let (call_id, partner) = registry.lookup_partner("alice").unwrap();
        assert_eq!(call_id, "c1");
        assert_eq!(partner.user_id, "bob");

        assert!(registry.lookup_partner("carol").is_none());
    }

    #[test]
    fn status_only_moves_forward() {
        let registry = ActiveCallRegistry::new();
        registry.insert(call("c1", "alice", "bob"));

        registry.mark_connected("c1").unwrap();
        assert_eq!(registry.get("c1").unwrap().status, CallStatus::Connected);

        // Idempotent while active
        registry.mark_connected("c1").unwrap();

        // Ended calls leave the registry; connecting them again is not possible
        registry.remove_for_end("alice", "c1").unwrap();
        assert!(matches!(
            registry.mark_connected("c1"),
            Err(CallError::CallNotFound)
        ));
    }

    #[test]
    fn end_requires_participant() {
        let registry = ActiveCallRegistry::new();
        registry.insert(call("c1", "alice", "bob"));

        assert!(matches!(
            registry.remove_for_end("carol", "c1"),
            Err(CallError::CallNotFound)
        ));
        assert_eq!(registry.len(), 1);

        registry.remove_for_end("bob", "c1").unwrap();
        assert!(matches!(
            registry.remove_for_end("bob", "c1"),
            Err(CallError::CallNotFound)
        ));
    }

    #[test]
    fn disconnect_removes_all_calls_for_connection() {
        let registry = ActiveCallRegistry::new();
        registry.insert(call("c1", "alice", "bob"));
        registry.insert(call("c2", "carol", "dave"));

        let removed = registry.remove_calls_for_connection("conn-alice");
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].1.user_id, "bob");
        assert_eq!(registry.len(), 1);
        assert!(registry.get("c2").is_some());
    }
}
