pub mod engine;
pub mod queue;
pub mod registry;
pub mod signaling;
pub mod store;
pub mod strategy;

use chrono::Utc;
use thiserror::Error;

use crate::db::models::CallRecord;
use crate::state::AppState;
use crate::ws::broadcast::send_to_user;
use crate::ws::events::ServerEvent;

/// Error taxonomy for call operations.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("call not found")]
    CallNotFound,
    #[error("internal error")]
    Internal,
}

impl CallError {
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::CallNotFound => "call-not-found",
            CallError::Internal => "internal",
        }
    }
}

/// Explicitly end a call: remove it from the in-memory registry, persist the
/// final record (status ended, duration), and notify the partner. Signals
/// CallNotFound when the call doesn't exist or the caller isn't a participant.
pub async fn end_call(
    state: &AppState,
    user_id: &str,
    call_id: &str,
) -> Result<CallRecord, CallError> {
    let active = state.calls.remove_for_end(user_id, call_id)?;

    let ended_at = Utc::now();
    let duration_secs = (ended_at - active.started_at).num_seconds().max(0);
    let record = match state
        .call_store
        .finish(call_id.to_string(), ended_at.to_rfc3339(), duration_secs)
        .await
    {
        Ok(record) => record,
        Err(e) => {
            tracing::error!(error = %e, call_id = %call_id, "Failed to persist call end");
            // Persistence failed: the call is still live. Restore the registry
            // entry so signaling keeps working and a retry can end it.
            state.calls.insert(active);
            return Err(CallError::Internal);
        }
    };

    if let Some(partner) = active.partner_of(user_id) {
        send_to_user(
            &state.registry,
            &partner.user_id,
            &ServerEvent::PartnerLeftCall {
                call_id: call_id.to_string(),
            },
        );
    }

    tracing::info!(call_id = %call_id, user_id = %user_id, duration_secs, "Call ended");
    Ok(record)
}

/// Implicit call teardown on disconnect: end every active call that the
/// dropped connection participates in and tell the surviving partner.
pub async fn end_calls_for_connection(state: &AppState, connection_id: &str) {
    for (active, partner) in state.calls.remove_calls_for_connection(connection_id) {
        let ended_at = Utc::now();
        let duration_secs = (ended_at - active.started_at).num_seconds().max(0);
        if let Err(e) = state
            .call_store
            .finish(active.call_id.clone(), ended_at.to_rfc3339(), duration_secs)
            .await
        {
            tracing::warn!(
                error = %e,
                call_id = %active.call_id,
                "Failed to persist implicit call end"
            );
        }

        send_to_user(
            &state.registry,
            &partner.user_id,
            &ServerEvent::PartnerLeftCall {
                call_id: active.call_id.clone(),
            },
        );

        tracing::info!(
            call_id = %active.call_id,
            connection_id = %connection_id,
            "Call ended by participant disconnect"
        );
    }
}
