use chrono::{DateTime, Utc};
/// Event schema for the chat Kafka topics
///
/// Events are immutable once emitted. Each carries a unique `event_id` so that
/// at-least-once consumers can drop redeliveries.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Records embedded in events
pub mod chat;
// Closed event payload union
pub mod events;

pub use chat::{
    ChatMessage, MessageDeletion, MessageStatus, MessageStatusUpdate, MessageType,
    PresenceRecord, PresenceStatus, TypingRecord,
};
pub use events::{ChatEventPayload, ChatEventType};

/// Current schema version for all chat events
pub const SCHEMA_VERSION: u32 = 1;

/// Kafka topic names
pub mod topics {
    pub const MESSAGE_EVENTS: &str = "message-events";
    pub const PRESENCE_EVENTS: &str = "presence-events";
    pub const TYPING_EVENTS: &str = "typing-events";

    pub const ALL: [&str; 3] = [MESSAGE_EVENTS, PRESENCE_EVENTS, TYPING_EVENTS];
}

/// Envelope for every chat event on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Unique per emission; the idempotency key for consumers
    pub event_id: Uuid,
    pub event_type: ChatEventType,
    /// Originator of the event
    pub user_id: String,
    /// User whose inbox or session the event is addressed to
    pub target_user_id: String,
    pub timestamp: DateTime<Utc>,
    pub schema_version: u32,
    /// Source service that generated the event
    pub source: String,
    pub payload: ChatEventPayload,
}

impl ChatEvent {
    pub fn new(source: impl Into<String>, payload: ChatEventPayload) -> Self {
        let (user_id, target_user_id) = payload.participants();
        Self {
            event_id: Uuid::new_v4(),
            event_type: payload.event_type(),
            user_id: user_id.to_string(),
            target_user_id: target_user_id.to_string(),
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION,
            source: source.into(),
            payload,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.payload.topic()
    }

    /// Partition key keeping per-user ordering on the topic.
    ///
    /// Message events partition by the inbox owner, presence by the user,
    /// typing by the target.
    pub fn partition_key(&self) -> &str {
        match self.payload {
            ChatEventPayload::UserOnline(_)
            | ChatEventPayload::UserOffline(_)
            | ChatEventPayload::UserStatusChanged(_) => &self.user_id,
            _ => &self.target_user_id,
        }
    }

    /// Embedded message, for variants that carry one.
    pub fn message(&self) -> Option<&ChatMessage> {
        match &self.payload {
            ChatEventPayload::MessageSent(m) | ChatEventPayload::MessageEdited(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, recipient: &str) -> ChatMessage {
        let now = Utc::now();
        ChatMessage {
            message_id: Uuid::new_v4().to_string(),
            conversation_key: format!("{sender}_{recipient}"),
            sender_id: sender.to_string(),
            recipient_id: recipient.to_string(),
            content: "hi".to_string(),
            message_type: MessageType::Text,
            status: MessageStatus::Sent,
            timestamp: now,
            reply_to_message_id: None,
            is_edited: false,
            edited_at: None,
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_envelope_fills_participants() {
        let event = ChatEvent::new(
            "chat-delivery-service",
            ChatEventPayload::MessageSent(message("u1", "u2")),
        );
        assert_eq!(event.event_type, ChatEventType::MessageSent);
        assert_eq!(event.user_id, "u1");
        assert_eq!(event.target_user_id, "u2");
        assert_eq!(event.partition_key(), "u2");
        assert_eq!(event.topic(), topics::MESSAGE_EVENTS);
        assert_eq!(event.schema_version, SCHEMA_VERSION);
        assert!(event.message().is_some());
    }

    #[test]
    fn test_status_events_partition_by_sender() {
        let mut msg = message("u1", "u2");
        msg.status = MessageStatus::Delivered;
        let event = ChatEvent::new(
            "chat-delivery-service",
            ChatEventPayload::MessageDelivered(MessageStatusUpdate::from(&msg)),
        );
        assert_eq!(event.partition_key(), "u1");
        assert!(event.message().is_none());
    }

    #[test]
    fn test_presence_partitions_by_user() {
        let record = PresenceRecord::offline("u9", Utc::now());
        let event = ChatEvent::new("chat-delivery-service", ChatEventPayload::UserOffline(record));
        assert_eq!(event.partition_key(), "u9");
        assert_eq!(event.topic(), topics::PRESENCE_EVENTS);
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = ChatEvent::new("svc", ChatEventPayload::MessageSent(message("a", "b")));
        let b = ChatEvent::new("svc", ChatEventPayload::MessageSent(message("a", "b")));
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_event_json_roundtrip() {
        let event = ChatEvent::new("svc", ChatEventPayload::MessageSent(message("u1", "u2")));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"MESSAGE_SENT\""));
        let back: ChatEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
