use chrono::{DateTime, Utc};
use event_schema::{ChatMessage, MessageStatus, PresenceStatus};
use serde::{Deserialize, Serialize};

/// Inbound WebSocket events from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    #[serde(rename = "typing")]
    Typing { target_user_id: String, typing: bool },

    /// Client acknowledges a message: `delivered` on receipt, `seen` on display
    #[serde(rename = "ack")]
    Ack {
        message_id: String,
        peer_id: String,
        status: MessageStatus,
    },

    #[serde(rename = "ping")]
    Ping,
}

/// Outbound WebSocket events from server to client
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsOutboundEvent {
    #[serde(rename = "message.new")]
    MessageNew { message: ChatMessage },

    #[serde(rename = "message.status")]
    MessageStatus {
        message_id: String,
        conversation_key: String,
        status: MessageStatus,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "message.edited")]
    MessageEdited { message: ChatMessage },

    #[serde(rename = "message.deleted")]
    MessageDeleted {
        message_id: String,
        conversation_key: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "presence")]
    Presence {
        user_id: String,
        online: bool,
        status: PresenceStatus,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "typing")]
    Typing {
        user_id: String,
        conversation_key: String,
        typing: bool,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl WsOutboundEvent {
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize outbound ws event");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_typing_parses() {
        let evt: WsInboundEvent =
            serde_json::from_str(r#"{"type":"typing","target_user_id":"u2","typing":true}"#)
                .unwrap();
        assert!(matches!(
            evt,
            WsInboundEvent::Typing { ref target_user_id, typing: true } if target_user_id == "u2"
        ));
    }

    #[test]
    fn test_inbound_ack_parses() {
        let evt: WsInboundEvent = serde_json::from_str(
            r#"{"type":"ack","message_id":"m1","peer_id":"u1","status":"seen"}"#,
        )
        .unwrap();
        assert!(matches!(
            evt,
            WsInboundEvent::Ack { status: MessageStatus::Seen, .. }
        ));
    }

    #[test]
    fn test_outbound_status_shape() {
        let json = WsOutboundEvent::MessageStatus {
            message_id: "m1".into(),
            conversation_key: "u1_u2".into(),
            status: MessageStatus::Delivered,
            timestamp: Utc::now(),
        }
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "message.status");
        assert_eq!(value["status"], "delivered");
    }
}
