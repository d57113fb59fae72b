//! Integration tests for the matchmaking queue, the shuffle match engine,
//! signaling relay, and call lifecycle teardown.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsWrite = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;
type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Helper: start the server on a random port and return (base_url, addr, db).
/// The pool handle lets tests inspect persisted records and break tables for
/// failure-path coverage.
async fn start_test_server() -> (String, SocketAddr, pairline_server::db::DbPool) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = pairline_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = pairline_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = pairline_server::state::AppState::new(db.clone(), jwt_secret, 2000);
    let app = pairline_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr, db)
}

/// Register a user and return (user_id, access_token).
async fn register_user(base_url: &str, username: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({ "username": username }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201, "Registration failed for {}", username);
    let body: serde_json::Value = resp.json().await.unwrap();
    (
        body["user_id"].as_str().unwrap().to_string(),
        body["access_token"].as_str().unwrap().to_string(),
    )
}

/// Connect an authenticated WebSocket session.
async fn connect_ws(addr: SocketAddr, access_token: &str) -> (WsWrite, WsRead) {
    let ws_url = format!("ws://{}/ws?token={}", addr, access_token);
    // TCP_NODELAY keeps back-to-back small frames (e.g. join-queue then
    // leave-queue) from being held by Nagle's algorithm, which would let a
    // later frame on another connection overtake them server-side.
    let tcp = tokio::net::TcpStream::connect(addr)
        .await
        .expect("Failed to connect TCP");
    tcp.set_nodelay(true).expect("Failed to set TCP_NODELAY");
    let (ws_stream, _) =
        tokio_tungstenite::client_async(ws_url.as_str(), tokio_tungstenite::MaybeTlsStream::Plain(tcp))
            .await
            .expect("Failed to connect to WebSocket");
    ws_stream.split()
}

async fn send_event(write: &mut WsWrite, event: serde_json::Value) {
    write
        .send(Message::Text(event.to_string().into()))
        .await
        .expect("Failed to send event");
}

/// Read events until one with the given type arrives, skipping everything
/// else (presence broadcasts and such). Returns None on timeout.
async fn try_next_event_of(
    read: &mut WsRead,
    event_type: &str,
    timeout_ms: u64,
) -> Option<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match tokio::time::timeout(remaining, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let event: serde_json::Value =
                    serde_json::from_str(text.as_str()).expect("Server sent malformed JSON");
                if event["type"] == event_type {
                    return Some(event);
                }
            }
            Ok(Some(Ok(_))) => continue, // ping/pong frames
            _ => return None,
        }
    }
}

async fn next_event_of(read: &mut WsRead, event_type: &str) -> serde_json::Value {
    try_next_event_of(read, event_type, 2000)
        .await
        .unwrap_or_else(|| panic!("Timed out waiting for '{}' event", event_type))
}

/// A registered, connected user participating in matchmaking.
struct TestUser {
    user_id: String,
    write: WsWrite,
    read: WsRead,
}

async fn join_user(base_url: &str, addr: SocketAddr, username: &str) -> TestUser {
    let (user_id, token) = register_user(base_url, username).await;
    let (write, read) = connect_ws(addr, &token).await;
    TestUser {
        user_id,
        write,
        read,
    }
}

/// Queue two users and wait for both match notifications.
/// Returns (call_id, initiator, callee).
async fn match_pair(mut a: TestUser, mut b: TestUser) -> (String, TestUser, TestUser) {
    send_event(&mut a.write, json!({ "type": "join-queue" })).await;
    send_event(&mut b.write, json!({ "type": "join-queue" })).await;

    let event_a = next_event_of(&mut a.read, "match_found").await;
    let event_b = next_event_of(&mut b.read, "match_found").await;

    assert_eq!(event_a["call_id"], event_b["call_id"]);
    assert_eq!(event_a["peer_user_id"], b.user_id.as_str());
    assert_eq!(event_b["peer_user_id"], a.user_id.as_str());
    assert_ne!(
        event_a["is_initiator"], event_b["is_initiator"],
        "Exactly one side must initiate"
    );

    let call_id = event_a["call_id"].as_str().unwrap().to_string();
    if event_a["is_initiator"] == true {
        (call_id, a, b)
    } else {
        (call_id, b, a)
    }
}

#[tokio::test]
async fn test_two_users_matched_into_one_call() {
    let (base_url, addr, _db) = start_test_server().await;
    let alice = join_user(&base_url, addr, "alice").await;
    let bob = join_user(&base_url, addr, "bob").await;

    let (call_id, initiator, callee) = match_pair(alice, bob).await;
    assert!(!call_id.is_empty());
    assert_ne!(initiator.user_id, callee.user_id);
}

#[tokio::test]
async fn test_odd_user_waits_for_next_partner() {
    let (base_url, addr, _db) = start_test_server().await;
    let mut users = Vec::new();
    for name in ["alice", "bob", "carol"] {
        users.push(join_user(&base_url, addr, name).await);
    }

    for user in users.iter_mut() {
        send_event(&mut user.write, json!({ "type": "join-queue" })).await;
    }

    // Exactly one pair forms; the odd user out hears nothing
    let mut matched = 0;
    let mut waiting_index = None;
    for (i, user) in users.iter_mut().enumerate() {
        match try_next_event_of(&mut user.read, "match_found", 1500).await {
            Some(_) => matched += 1,
            None => waiting_index = Some(i),
        }
    }
    assert_eq!(matched, 2);
    let waiting_index = waiting_index.expect("One user must be left waiting");

    // A fourth joiner pairs with the leftover
    let mut dave = join_user(&base_url, addr, "dave").await;
    send_event(&mut dave.write, json!({ "type": "join-queue" })).await;

    let event = next_event_of(&mut dave.read, "match_found").await;
    assert_eq!(
        event["peer_user_id"],
        users[waiting_index].user_id.as_str()
    );
    next_event_of(&mut users[waiting_index].read, "match_found").await;
}

#[tokio::test]
async fn test_duplicate_join_queue_is_idempotent() {
    let (base_url, addr, _db) = start_test_server().await;
    let mut alice = join_user(&base_url, addr, "alice").await;

    send_event(&mut alice.write, json!({ "type": "join-queue" })).await;
    send_event(&mut alice.write, json!({ "type": "join-queue" })).await;

    // No self-match and no error from the duplicate join
    assert!(try_next_event_of(&mut alice.read, "match_found", 800)
        .await
        .is_none());
    assert!(try_next_event_of(&mut alice.read, "error", 100)
        .await
        .is_none());

    // A real partner still produces exactly one match
    let mut bob = join_user(&base_url, addr, "bob").await;
    send_event(&mut bob.write, json!({ "type": "join-queue" })).await;

    let event = next_event_of(&mut alice.read, "match_found").await;
    assert_eq!(event["peer_user_id"], bob.user_id.as_str());
    next_event_of(&mut bob.read, "match_found").await;
}

#[tokio::test]
async fn test_leave_queue_prevents_match() {
    let (base_url, addr, _db) = start_test_server().await;
    let mut alice = join_user(&base_url, addr, "alice").await;
    let mut bob = join_user(&base_url, addr, "bob").await;

    send_event(&mut alice.write, json!({ "type": "join-queue" })).await;
    send_event(&mut alice.write, json!({ "type": "leave-queue" })).await;
    send_event(&mut bob.write, json!({ "type": "join-queue" })).await;

    assert!(try_next_event_of(&mut alice.read, "match_found", 800)
        .await
        .is_none());
    assert!(try_next_event_of(&mut bob.read, "match_found", 100)
        .await
        .is_none());
}

#[tokio::test]
async fn test_signaling_relay_between_partners() {
    let (base_url, addr, _db) = start_test_server().await;
    let alice = join_user(&base_url, addr, "alice").await;
    let bob = join_user(&base_url, addr, "bob").await;

    let (call_id, mut initiator, mut callee) = match_pair(alice, bob).await;

    // Offer flows initiator -> callee
    send_event(
        &mut initiator.write,
        json!({
            "type": "signaling-offer",
            "to": callee.user_id,
            "payload": { "sdp": "offer-sdp" }
        }),
    )
    .await;
    let offer = next_event_of(&mut callee.read, "signaling-offer").await;
    assert_eq!(offer["call_id"], call_id.as_str());
    assert_eq!(offer["from_user_id"], initiator.user_id.as_str());
    assert_eq!(offer["payload"]["sdp"], "offer-sdp");

    // Answer flows back
    send_event(
        &mut callee.write,
        json!({
            "type": "signaling-answer",
            "to": initiator.user_id,
            "payload": { "sdp": "answer-sdp" }
        }),
    )
    .await;
    let answer = next_event_of(&mut initiator.read, "signaling-answer").await;
    assert_eq!(answer["from_user_id"], callee.user_id.as_str());
    assert_eq!(answer["payload"]["sdp"], "answer-sdp");

    // ICE candidates are relayed opaquely
    send_event(
        &mut initiator.write,
        json!({
            "type": "signaling-ice-candidate",
            "to": callee.user_id,
            "payload": { "candidate": "candidate:0 1 UDP 1 203.0.113.7 50000 typ host" }
        }),
    )
    .await;
    let candidate = next_event_of(&mut callee.read, "signaling-ice-candidate").await;
    assert_eq!(candidate["call_id"], call_id.as_str());
    assert!(candidate["payload"]["candidate"]
        .as_str()
        .unwrap()
        .starts_with("candidate:"));
}

#[tokio::test]
async fn test_signaling_without_active_call_is_error() {
    let (base_url, addr, _db) = start_test_server().await;
    let mut alice = join_user(&base_url, addr, "alice").await;
    let bob = join_user(&base_url, addr, "bob").await;

    // No match happened; alice has no partner to signal
    send_event(
        &mut alice.write,
        json!({
            "type": "signaling-offer",
            "to": bob.user_id,
            "payload": { "sdp": "x" }
        }),
    )
    .await;
    let error = next_event_of(&mut alice.read, "error").await;
    assert_eq!(error["kind"], "call-not-found");
}

#[tokio::test]
async fn test_call_connected_notifies_both() {
    let (base_url, addr, _db) = start_test_server().await;
    let alice = join_user(&base_url, addr, "alice").await;
    let bob = join_user(&base_url, addr, "bob").await;

    let (call_id, mut initiator, mut callee) = match_pair(alice, bob).await;

    send_event(
        &mut initiator.write,
        json!({ "type": "call-connected", "call_id": call_id }),
    )
    .await;

    let event = next_event_of(&mut initiator.read, "call-connected").await;
    assert_eq!(event["call_id"], call_id.as_str());
    let event = next_event_of(&mut callee.read, "call-connected").await;
    assert_eq!(event["call_id"], call_id.as_str());
}

#[tokio::test]
async fn test_call_connected_rejects_outsider() {
    let (base_url, addr, _db) = start_test_server().await;
    let alice = join_user(&base_url, addr, "alice").await;
    let bob = join_user(&base_url, addr, "bob").await;
    let mut carol = join_user(&base_url, addr, "carol").await;

    let (call_id, _initiator, _callee) = match_pair(alice, bob).await;

    send_event(
        &mut carol.write,
        json!({ "type": "call-connected", "call_id": call_id }),
    )
    .await;
    let error = next_event_of(&mut carol.read, "error").await;
    assert_eq!(error["kind"], "call-not-found");
}

#[tokio::test]
async fn test_end_call_notifies_partner_and_is_terminal() {
    let (base_url, addr, db) = start_test_server().await;
    let alice = join_user(&base_url, addr, "alice").await;
    let bob = join_user(&base_url, addr, "bob").await;

    let (call_id, mut initiator, mut callee) = match_pair(alice, bob).await;

    send_event(
        &mut initiator.write,
        json!({ "type": "call-connected", "call_id": call_id }),
    )
    .await;
    next_event_of(&mut initiator.read, "call-connected").await;
    next_event_of(&mut callee.read, "call-connected").await;

    send_event(
        &mut initiator.write,
        json!({ "type": "end-call", "call_id": call_id }),
    )
    .await;

    let ended = next_event_of(&mut initiator.read, "call-ended").await;
    assert_eq!(ended["call_id"], call_id.as_str());
    assert!(ended["duration_secs"].as_i64().unwrap() >= 0);

    let left = next_event_of(&mut callee.read, "partner_left_call").await;
    assert_eq!(left["call_id"], call_id.as_str());

    // The durable record reflects the full lifecycle
    let record = pairline_server::call::store::CallStore::new(db.clone())
        .find(call_id.clone())
        .await
        .expect("Store lookup failed")
        .expect("Call record must persist after ending");
    assert_eq!(record.status, "ended");
    assert!(record.ended_at.is_some());
    assert!(record.duration_secs.unwrap() >= 0);

    // Ended is terminal: signaling into the dead call fails
    send_event(
        &mut callee.write,
        json!({
            "type": "signaling-offer",
            "to": initiator.user_id,
            "payload": { "sdp": "late" }
        }),
    )
    .await;
    let error = next_event_of(&mut callee.read, "error").await;
    assert_eq!(error["kind"], "call-not-found");

    // ...and ending it again fails the same way
    send_event(
        &mut initiator.write,
        json!({ "type": "end-call", "call_id": call_id }),
    )
    .await;
    let error = next_event_of(&mut initiator.read, "error").await;
    assert_eq!(error["kind"], "call-not-found");
}

#[tokio::test]
async fn test_disconnect_ends_call_for_partner() {
    let (base_url, addr, _db) = start_test_server().await;
    let alice = join_user(&base_url, addr, "alice").await;
    let bob = join_user(&base_url, addr, "bob").await;

    let (call_id, mut initiator, mut callee) = match_pair(alice, bob).await;

    // The initiator's socket drops without an explicit end-call
    initiator.write.send(Message::Close(None)).await.unwrap();

    let left = next_event_of(&mut callee.read, "partner_left_call").await;
    assert_eq!(left["call_id"], call_id.as_str());
}

#[tokio::test]
async fn test_disconnect_removes_user_from_queue() {
    let (base_url, addr, _db) = start_test_server().await;
    let mut alice = join_user(&base_url, addr, "alice").await;
    let mut bob = join_user(&base_url, addr, "bob").await;

    send_event(&mut alice.write, json!({ "type": "join-queue" })).await;
    alice.write.send(Message::Close(None)).await.unwrap();

    // Give the server a moment to run disconnect cleanup
    tokio::time::sleep(Duration::from_millis(100)).await;

    send_event(&mut bob.write, json!({ "type": "join-queue" })).await;
    assert!(
        try_next_event_of(&mut bob.read, "match_found", 800)
            .await
            .is_none(),
        "A disconnected user must not be matched"
    );
}

#[tokio::test]
async fn test_end_call_persist_failure_keeps_call_active() {
    use pairline_server::call::registry::{ActiveCall, CallStatus, Participant};

    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();
    let db = pairline_server::db::init_db(&data_dir).expect("Failed to init DB");
    let state = pairline_server::state::AppState::new(db.clone(), vec![0u8; 32], 2000);

    state.calls.insert(ActiveCall {
        call_id: "c1".to_string(),
        participants: [
            Participant {
                user_id: "alice".to_string(),
                connection_id: "conn-alice".to_string(),
            },
            Participant {
                user_id: "bob".to_string(),
                connection_id: "conn-bob".to_string(),
            },
        ],
        status: CallStatus::Connected,
        started_at: chrono::Utc::now(),
    });

    // Break call persistence out from under the state
    db.lock().unwrap().execute("DROP TABLE calls", []).unwrap();

    let result = pairline_server::call::end_call(&state, "alice", "c1").await;
    assert!(result.is_err(), "Ending must fail when persistence fails");

    // A failed end leaves the call live: lookups still resolve and a retry
    // can end it once the store recovers
    let active = state
        .calls
        .get("c1")
        .expect("Call must survive a failed end");
    assert_eq!(active.status, CallStatus::Connected);

    let (found_call, partner) = state.calls.lookup_partner("alice").unwrap();
    assert_eq!(found_call, "c1");
    assert_eq!(partner.user_id, "bob");
}
