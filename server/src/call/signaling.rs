//! WebRTC signaling relay between matched participants.
//!
//! The server never inspects signaling payloads; it only looks up the
//! partner's connection through the active call registry and forwards the
//! envelope with the sender's identity attached.

use crate::call::CallError;
use crate::state::AppState;
use crate::ws::broadcast::send_to_user;
use crate::ws::events::ServerEvent;

/// Relay an SDP offer to the caller's current partner.
pub fn relay_offer(
    state: &AppState,
    from_user_id: &str,
    to: &str,
    payload: serde_json::Value,
) -> Result<(), CallError> {
    let (call_id, partner) = resolve_partner(state, from_user_id, to)?;
    send_to_user(
        &state.registry,
        &partner,
        &ServerEvent::SignalingOffer {
            call_id,
            from_user_id: from_user_id.to_string(),
            payload,
        },
    );
    Ok(())
}

/// Relay an SDP answer to the caller's current partner.
pub fn relay_answer(
    state: &AppState,
    from_user_id: &str,
    to: &str,
    payload: serde_json::Value,
) -> Result<(), CallError> {
    let (call_id, partner) = resolve_partner(state, from_user_id, to)?;
    send_to_user(
        &state.registry,
        &partner,
        &ServerEvent::SignalingAnswer {
            call_id,
            from_user_id: from_user_id.to_string(),
            payload,
        },
    );
    Ok(())
}

/// Relay an ICE candidate to the caller's current partner.
pub fn relay_ice_candidate(
    state: &AppState,
    from_user_id: &str,
    to: &str,
    payload: serde_json::Value,
) -> Result<(), CallError> {
    let (call_id, partner) = resolve_partner(state, from_user_id, to)?;
    send_to_user(
        &state.registry,
        &partner,
        &ServerEvent::SignalingIceCandidate {
            call_id,
            from_user_id: from_user_id.to_string(),
            payload,
        },
    );
    Ok(())
}

/// Signaling handshake completed: transition connecting -> connected in the
/// registry and the persisted record, then tell both participants.
pub async fn handle_call_connected(
    state: &AppState,
    user_id: &str,
    call_id: &str,
) -> Result<(), CallError> {
    let call = state.calls.get(call_id).ok_or(CallError::CallNotFound)?;
    if !call.involves_user(user_id) {
        return Err(CallError::CallNotFound);
    }

    state.calls.mark_connected(call_id)?;
    if let Err(e) = state.call_store.mark_connected(call_id.to_string()).await {
        tracing::warn!(error = %e, call_id = %call_id, "Failed to mirror connected status");
    }

    let event = ServerEvent::CallConnected {
        call_id: call_id.to_string(),
    };
    for participant in &call.participants {
        send_to_user(&state.registry, &participant.user_id, &event);
    }
    Ok(())
}

/// Find the caller's active call and verify the addressed peer is actually
/// the partner. Anything else is CallNotFound — signaling to a stranger is
/// indistinguishable from signaling into a dead call.
fn resolve_partner(
    state: &AppState,
    from_user_id: &str,
    to: &str,
) -> Result<(String, String), CallError> {
    let (call_id, partner) = state
        .calls
        .lookup_partner(from_user_id)
        .ok_or(CallError::CallNotFound)?;
    if partner.user_id != to {
        return Err(CallError::CallNotFound);
    }
    Ok((call_id, partner.user_id))
}
