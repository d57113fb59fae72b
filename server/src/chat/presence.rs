//! Server-side presence tracking and broadcast.
//!
//! In-memory presence store (DashMap) keyed by user id. Presence is advisory
//! UI state, not a consistency-critical data path: broadcasts are best-effort
//! with no delivery guarantee, which is why every mutating method returns
//! nothing and cannot fail. Records are never deleted — after disconnect only
//! the online flag flips false.

use axum::{extract::State, Json};
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::middleware::Claims;
use crate::state::AppState;
use crate::ws::broadcast::{broadcast_except, send_to_user};
use crate::ws::events::{PresenceStatus, ServerEvent};
use crate::ws::registry::ConnectionRegistry;

/// Per-user presence record.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceRecord {
    pub online: bool,
    pub last_seen: String,
    pub typing_to: Option<String>,
}

#[derive(Clone, Default)]
pub struct PresenceTracker {
    records: Arc<DashMap<String, PresenceRecord>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user online and broadcast the status change to everyone else.
    pub fn set_online(&self, registry: &ConnectionRegistry, user_id: &str) {
        self.set_status(registry, user_id, PresenceStatus::Online);
    }

    /// Mark a user offline. The record persists with online=false.
    pub fn set_offline(&self, registry: &ConnectionRegistry, user_id: &str) {
        self.set_status(registry, user_id, PresenceStatus::Offline);
    }

    fn set_status(&self, registry: &ConnectionRegistry, user_id: &str, status: PresenceStatus) {
        let last_seen = Utc::now().to_rfc3339();
        self.records.insert(
            user_id.to_string(),
            PresenceRecord {
                online: status == PresenceStatus::Online,
                last_seen: last_seen.clone(),
                typing_to: None,
            },
        );
        broadcast_except(
            registry,
            user_id,
            &ServerEvent::UserStatus {
                user_id: user_id.to_string(),
                status,
                last_seen,
            },
        );
    }

    /// Update the typing pointer and notify the target, if bound. An unbound
    /// target means the indicator is silently dropped — no queuing.
    pub fn set_typing(
        &self,
        registry: &ConnectionRegistry,
        user_id: &str,
        target_user_id: &str,
        is_typing: bool,
    ) {
        if let Some(mut record) = self.records.get_mut(user_id) {
            record.typing_to = is_typing.then(|| target_user_id.to_string());
        }
        send_to_user(
            registry,
            target_user_id,
            &ServerEvent::UserTyping {
                user_id: user_id.to_string(),
                is_typing,
            },
        );
    }

    pub fn status(&self, user_id: &str) -> Option<PresenceRecord> {
        self.records.get(user_id).map(|r| r.clone())
    }

    /// Snapshot of all tracked users, used for the initial push to a newly
    /// connected client.
    pub fn snapshot(&self) -> Vec<(String, PresenceRecord)> {
        self.records
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

// --- REST endpoint ---

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub user_id: String,
    pub online: bool,
    pub last_seen: String,
}

/// GET /api/presence — current presence for all tracked users. JWT auth required.
pub async fn get_presence(
    State(state): State<AppState>,
    _claims: Claims,
) -> Json<Vec<PresenceResponse>> {
    let entries = state
        .presence
        .snapshot()
        .into_iter()
        .map(|(user_id, record)| PresenceResponse {
            user_id,
            online: record.online,
            last_seen: record.last_seen,
        })
        .collect();
    Json(entries)
}
