//! Best-effort event fan-out over the connection registry.
//!
//! All sends here are fire-and-forget: a closed or missing connection
//! silently drops the event. Callers that care about reachability check the
//! boolean result; nothing retries.

use axum::extract::ws::Message;

use crate::ws::events::ServerEvent;
use crate::ws::registry::ConnectionRegistry;
use crate::ws::ConnectionSender;

/// Serialize and send an event to one connection channel.
pub fn send_event(tx: &ConnectionSender, event: &ServerEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => tx.send(Message::Text(json.into())).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server event");
            false
        }
    }
}

/// Send an event to a user's current connection, if bound.
/// Returns false when the user is unreachable — an expected state, not an error.
pub fn send_to_user(registry: &ConnectionRegistry, user_id: &str, event: &ServerEvent) -> bool {
    match registry.resolve(user_id) {
        Some(session) => send_event(&session.sender, event),
        None => false,
    }
}

/// Broadcast an event to every bound connection except `skip_user_id`.
pub fn broadcast_except(registry: &ConnectionRegistry, skip_user_id: &str, event: &ServerEvent) {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server event");
            return;
        }
    };
    for (user_id, session) in registry.sessions() {
        if user_id != skip_user_id {
            let _ = session.sender.send(Message::Text(json.clone().into()));
        }
    }
}
