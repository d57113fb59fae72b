//! Inbound event dispatch.
//!
//! Every handler catches its component's signaled errors and translates them
//! into an outbound `error` event scoped to the originating connection; an
//! error from one event never takes down the shared event loop.

use tokio::sync::mpsc::UnboundedSender;

use crate::call::{self, signaling, CallError};
use crate::chat::{delivery, ChatError};
use crate::state::AppState;
use crate::ws::broadcast::send_event;
use crate::ws::events::{ClientEvent, ServerEvent};

type Tx = UnboundedSender<axum::extract::ws::Message>;

/// Decode a text frame and dispatch it to the matching handler.
pub async fn handle_text_message(
    text: &str,
    tx: &Tx,
    state: &AppState,
    user_id: &str,
    connection_id: &str,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Malformed client event");
            send_error(tx, "bad-request", "Malformed event payload");
            return;
        }
    };

    dispatch_event(event, tx, state, user_id, connection_id).await;
}

async fn dispatch_event(
    event: ClientEvent,
    tx: &Tx,
    state: &AppState,
    user_id: &str,
    connection_id: &str,
) {
    match event {
        ClientEvent::SendMessage {
            receiver_id,
            content,
        } => {
            if let Err(e) = delivery::send_message(state, user_id, &receiver_id, content).await {
                send_chat_error(tx, &e);
            }
        }
        ClientEvent::MarkDelivered { message_id } => {
            if let Err(e) = delivery::mark_delivered(state, &message_id).await {
                send_chat_error(tx, &e);
            }
        }
        ClientEvent::MarkRead { message_id } => {
            if let Err(e) = delivery::mark_read(state, &message_id).await {
                send_chat_error(tx, &e);
            }
        }
        ClientEvent::Typing {
            receiver_id,
            is_typing,
        } => {
            state
                .presence
                .set_typing(&state.registry, user_id, &receiver_id, is_typing);
        }
        ClientEvent::DeleteMessage { message_id } => {
            if let Err(e) = delivery::delete_message(state, user_id, &message_id).await {
                send_chat_error(tx, &e);
            }
        }
        ClientEvent::JoinQueue => {
            let accepted = state.queue.enqueue(user_id, connection_id);
            tracing::debug!(user_id = %user_id, accepted, "Queue join");
            // Duplicate join is an idempotent no-op, not an error. Either
            // way, try a round right away rather than waiting for the timer.
            let outcome = state.engine.run_matching_round().await;
            tracing::debug!(
                pairs_matched = outcome.pairs_matched,
                remaining = outcome.remaining,
                "On-demand matching round"
            );
        }
        ClientEvent::LeaveQueue => {
            let removed = state.queue.dequeue(user_id);
            tracing::debug!(user_id = %user_id, removed, "Queue leave");
        }
        ClientEvent::SignalingOffer { to, payload } => {
            if let Err(e) = signaling::relay_offer(state, user_id, &to, payload) {
                send_call_error(tx, &e);
            }
        }
        ClientEvent::SignalingAnswer { to, payload } => {
            if let Err(e) = signaling::relay_answer(state, user_id, &to, payload) {
                send_call_error(tx, &e);
            }
        }
        ClientEvent::SignalingIceCandidate { to, payload } => {
            if let Err(e) = signaling::relay_ice_candidate(state, user_id, &to, payload) {
                send_call_error(tx, &e);
            }
        }
        ClientEvent::CallConnected { call_id } => {
            if let Err(e) = signaling::handle_call_connected(state, user_id, &call_id).await {
                send_call_error(tx, &e);
            }
        }
        ClientEvent::EndCall { call_id } => {
            match call::end_call(state, user_id, &call_id).await {
                Ok(record) => {
                    send_event(
                        tx,
                        &ServerEvent::CallEnded {
                            call_id: record.id,
                            duration_secs: record.duration_secs.unwrap_or(0),
                        },
                    );
                }
                Err(e) => send_call_error(tx, &e),
            }
        }
    }
}

fn send_chat_error(tx: &Tx, error: &ChatError) {
    send_error(tx, error.kind(), &error.to_string());
}

fn send_call_error(tx: &Tx, error: &CallError) {
    send_error(tx, error.kind(), &error.to_string());
}

/// Send a structured error event to the originating connection only.
pub fn send_error(tx: &Tx, kind: &str, message: &str) {
    send_event(
        tx,
        &ServerEvent::Error {
            kind: kind.to_string(),
            message: message.to_string(),
        },
    );
}
