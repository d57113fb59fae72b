//! Wire contract for the WebSocket event layer.
//!
//! Events are JSON envelopes tagged by a `type` field. Inbound events are
//! authenticated implicitly: the connection is bound to a user at upgrade
//! time, so payloads never carry identities for the sender side.

use serde::{Deserialize, Serialize};

use crate::db::models::ChatMessage;

/// Events a client may send over an authenticated connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    SendMessage {
        receiver_id: String,
        content: String,
    },
    MarkDelivered {
        message_id: String,
    },
    MarkRead {
        message_id: String,
    },
    Typing {
        receiver_id: String,
        is_typing: bool,
    },
    DeleteMessage {
        message_id: String,
    },
    JoinQueue,
    LeaveQueue,
    SignalingOffer {
        to: String,
        payload: serde_json::Value,
    },
    SignalingAnswer {
        to: String,
        payload: serde_json::Value,
    },
    #[serde(rename = "signaling-ice-candidate")]
    SignalingIceCandidate {
        to: String,
        payload: serde_json::Value,
    },
    CallConnected {
        call_id: String,
    },
    EndCall {
        call_id: String,
    },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    NewMessage {
        message: ChatMessage,
    },
    MessageDeliveryStatus {
        message_id: String,
        delivered_at: String,
    },
    MessageReadStatus {
        message_id: String,
        delivered_at: String,
        read_at: String,
    },
    UserTyping {
        user_id: String,
        is_typing: bool,
    },
    UserStatus {
        user_id: String,
        status: PresenceStatus,
        last_seen: String,
    },
    MessageDeleted {
        message_id: String,
    },
    Error {
        kind: String,
        message: String,
    },
    #[serde(rename = "match_found")]
    MatchFound {
        call_id: String,
        peer_user_id: String,
        peer_connection_id: String,
        is_initiator: bool,
    },
    SignalingOffer {
        call_id: String,
        from_user_id: String,
        payload: serde_json::Value,
    },
    SignalingAnswer {
        call_id: String,
        from_user_id: String,
        payload: serde_json::Value,
    },
    #[serde(rename = "signaling-ice-candidate")]
    SignalingIceCandidate {
        call_id: String,
        from_user_id: String,
        payload: serde_json::Value,
    },
    CallConnected {
        call_id: String,
    },
    CallEnded {
        call_id: String,
        duration_secs: i64,
    },
    #[serde(rename = "partner_left_call")]
    PartnerLeftCall {
        call_id: String,
    },
}

/// Online/offline flag carried by `user-status` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_spec_names() {
        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"send-message","receiver_id":"u2","content":"hi"}"#,
        )
        .unwrap();
        assert!(matches!(ev, ClientEvent::SendMessage { .. }));

        let ev: ClientEvent = serde_json::from_str(r#"{"type":"join-queue"}"#).unwrap();
        assert!(matches!(ev, ClientEvent::JoinQueue));

        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"signaling-ice-candidate","to":"u2","payload":{"candidate":"x"}}"#,
        )
        .unwrap();
        assert!(matches!(ev, ClientEvent::SignalingIceCandidate { .. }));
    }

    #[test]
    fn server_events_keep_source_tags() {
        let json = serde_json::to_value(ServerEvent::MatchFound {
            call_id: "c1".into(),
            peer_user_id: "u2".into(),
            peer_connection_id: "conn2".into(),
            is_initiator: true,
        })
        .unwrap();
        assert_eq!(json["type"], "match_found");

        let json = serde_json::to_value(ServerEvent::PartnerLeftCall {
            call_id: "c1".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "partner_left_call");
    }
}
