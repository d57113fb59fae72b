use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use crate::call;
use crate::state::AppState;
use crate::ws::broadcast::send_event;
use crate::ws::events::{PresenceStatus, ServerEvent};
use crate::ws::protocol;

/// Ping interval: server sends WebSocket ping every 30 seconds. Detects
/// abrupt disconnects that never send a close frame.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code sent to a session evicted by a newer join from the same user.
const CLOSE_SESSION_REPLACED: u16 = 4000;

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming messages, dispatches to protocol handlers
///
/// The mpsc channel allows any part of the system to send messages to this
/// client by cloning the sender.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let connection_id = Uuid::new_v4().to_string();

    // Last join wins: a previous session for this user gets force-closed.
    if let Some(evicted) = state.registry.bind(&user_id, &connection_id, tx.clone()) {
        tracing::info!(
            user_id = %user_id,
            old_connection_id = %evicted.connection_id,
            "Evicting replaced session"
        );
        let _ = evicted.sender.send(Message::Close(Some(CloseFrame {
            code: CLOSE_SESSION_REPLACED,
            reason: "Session replaced by a newer connection".into(),
        })));
    }

    // Broadcast online status to everyone else
    state.presence.set_online(&state.registry, &user_id);

    // Send the current presence snapshot to the newly connected client
    for (peer_id, record) in state.presence.snapshot() {
        if peer_id == user_id {
            continue;
        }
        let status = if record.online {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        };
        send_event(
            &tx,
            &ServerEvent::UserStatus {
                user_id: peer_id,
                status,
                last_seen: record.last_seen,
            },
        );
    }

    tracing::info!(
        user_id = %user_id,
        connection_id = %connection_id,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(&text, &tx, &state, &user_id, &connection_id)
                        .await;
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = %user_id,
                        "Received binary message (expected JSON text), ignoring"
                    );
                }
                Message::Pong(_) => {
                    // Notify the ping task
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    // Coordinated disconnect cleanup, keyed by connection id so a stale
    // (already replaced) session cannot tear down its successor's state:
    // registry binding, queue membership, active calls, then presence.
    let owner = state.registry.unbind(&connection_id);
    state.queue.remove_connection(&connection_id);
    call::end_calls_for_connection(&state, &connection_id).await;
    if let Some(user_id) = &owner {
        state.presence.set_offline(&state.registry, user_id);
    }

    tracing::info!(
        user_id = %user_id,
        connection_id = %connection_id,
        replaced = owner.is_none(),
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from the mpsc channel and forwards them to
/// the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
    }
}
