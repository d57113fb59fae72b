//! Presence-aware message delivery pipeline.
//!
//! `send_message` is the core path: validate, persist, then fan out to the
//! sender's and receiver's connections. Persistence strictly precedes
//! delivery — a message that failed to persist is never announced to anyone.
//! An unreachable receiver is not an error; the message stays in the store
//! undelivered and surfaces on the next history fetch. Delivered/read flags
//! are corrected opportunistically by explicit acknowledgement events, never
//! by a server-side redelivery queue.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::chat::ChatError;
use crate::db::models::ChatMessage;
use crate::db::users;
use crate::state::AppState;
use crate::ws::broadcast::send_to_user;
use crate::ws::events::ServerEvent;

/// Default page size for message history.
const DEFAULT_LIMIT: u32 = 50;
/// Maximum page size for message history.
const MAX_LIMIT: u32 = 100;

/// Validate, persist, and fan out a new message.
pub async fn send_message(
    state: &AppState,
    sender_id: &str,
    receiver_id: &str,
    content: String,
) -> Result<ChatMessage, ChatError> {
    if content.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    if content.chars().count() > state.max_message_len {
        return Err(ChatError::MessageTooLong);
    }

    // Receiver validation goes to the users table, not the connection
    // registry — the receiver need not be online.
    let exists = users::user_exists(state.db.clone(), receiver_id.to_string())
        .await
        .map_err(|_| ChatError::Internal)?;
    if !exists {
        return Err(ChatError::UserNotFound);
    }

    let message = state
        .chat_store
        .create(
            sender_id.to_string(),
            receiver_id.to_string(),
            content,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Message persistence failed");
            ChatError::MessageCreationFailed
        })?;

    // Fan out only after persistence succeeded. The sender's copy doubles as
    // the delivery confirmation; an unbound receiver simply misses the push.
    let event = ServerEvent::NewMessage {
        message: message.clone(),
    };
    send_to_user(&state.registry, sender_id, &event);
    send_to_user(&state.registry, receiver_id, &event);

    tracing::debug!(
        message_id = %message.id,
        sender_id = %sender_id,
        receiver_id = %receiver_id,
        "Message stored and fanned out"
    );

    Ok(message)
}

/// Acknowledge delivery and notify the original sender, if bound.
pub async fn mark_delivered(state: &AppState, message_id: &str) -> Result<ChatMessage, ChatError> {
    let message = state
        .chat_store
        .mark_delivered(message_id.to_string())
        .await
        .map_err(store_to_chat_error)?;

    if let Some(delivered_at) = message.delivered_at.clone() {
        send_to_user(
            &state.registry,
            &message.sender_id,
            &ServerEvent::MessageDeliveryStatus {
                message_id: message.id.clone(),
                delivered_at,
            },
        );
    }
    Ok(message)
}

/// Acknowledge read. Read implies delivered; the store backfills
/// delivered_at when the delivery acknowledgement never arrived.
pub async fn mark_read(state: &AppState, message_id: &str) -> Result<ChatMessage, ChatError> {
    let message = state
        .chat_store
        .mark_read(message_id.to_string())
        .await
        .map_err(store_to_chat_error)?;

    if let (Some(delivered_at), Some(read_at)) =
        (message.delivered_at.clone(), message.read_at.clone())
    {
        send_to_user(
            &state.registry,
            &message.sender_id,
            &ServerEvent::MessageReadStatus {
                message_id: message.id.clone(),
                delivered_at,
                read_at,
            },
        );
    }
    Ok(message)
}

/// Permanently delete a message and notify both participants, if bound.
/// Only a participant may delete; anyone else sees MessageNotFound.
pub async fn delete_message(
    state: &AppState,
    caller_id: &str,
    message_id: &str,
) -> Result<(), ChatError> {
    let existing = state
        .chat_store
        .find(message_id.to_string())
        .await
        .map_err(store_to_chat_error)?
        .ok_or(ChatError::MessageNotFound)?;

    if existing.sender_id != caller_id && existing.receiver_id != caller_id {
        return Err(ChatError::MessageNotFound);
    }

    let deleted = state
        .chat_store
        .delete(message_id.to_string())
        .await
        .map_err(store_to_chat_error)?;

    let event = ServerEvent::MessageDeleted {
        message_id: deleted.id.clone(),
    };
    send_to_user(&state.registry, &deleted.sender_id, &event);
    send_to_user(&state.registry, &deleted.receiver_id, &event);

    Ok(())
}

/// One page of conversation history, newest first.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    /// Id of the oldest returned message; pass as `before` for the next page.
    pub next_cursor: Option<String>,
}

/// Pure read of the history between two users. No registry interaction.
pub async fn fetch_history(
    state: &AppState,
    user_a: &str,
    user_b: &str,
    limit: u32,
    before: Option<String>,
) -> Result<HistoryResponse, ChatError> {
    let limit = limit.clamp(1, MAX_LIMIT);
    let page = state
        .chat_store
        .history(user_a.to_string(), user_b.to_string(), limit, before)
        .await
        .map_err(store_to_chat_error)?;

    let next_cursor = page.messages.last().map(|m| m.id.clone());
    Ok(HistoryResponse {
        messages: page.messages,
        has_more: page.has_more,
        next_cursor,
    })
}

fn store_to_chat_error(e: crate::db::StoreError) -> ChatError {
    match e {
        crate::db::StoreError::NotFound => ChatError::MessageNotFound,
        other => {
            tracing::error!(error = %other, "Message store failure");
            ChatError::Internal
        }
    }
}

// --- REST endpoint ---

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<String>,
    pub limit: Option<u32>,
}

/// GET /api/messages/{peer_id}?before={message_id}&limit={n}
/// Paginated history between the authenticated user and a peer.
pub async fn get_history(
    State(state): State<AppState>,
    claims: Claims,
    Path(peer_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let page = fetch_history(&state, &claims.sub, &peer_id, limit, query.before)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(page))
}
