use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, MessageDeletion, MessageStatusUpdate, PresenceRecord, TypingRecord};
use crate::topics;

/// Closed set of chat events.
///
/// Every variant carries only the fields it needs; consumers match on the
/// variant instead of inspecting an untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEventPayload {
    // ============================================================================
    // MESSAGE EVENTS (topic: message-events)
    // ============================================================================
    MessageSent(ChatMessage),
    MessageDelivered(MessageStatusUpdate),
    MessageSeen(MessageStatusUpdate),
    MessageEdited(ChatMessage),
    MessageDeleted(MessageDeletion),

    // ============================================================================
    // TYPING EVENTS (topic: typing-events)
    // ============================================================================
    UserTyping(TypingRecord),
    UserStoppedTyping(TypingRecord),

    // ============================================================================
    // PRESENCE EVENTS (topic: presence-events)
    // ============================================================================
    UserOnline(PresenceRecord),
    UserOffline(PresenceRecord),
    UserStatusChanged(PresenceRecord),
}

/// Event type labels, also written to the `event_type` Kafka header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatEventType {
    MessageSent,
    MessageDelivered,
    MessageSeen,
    MessageEdited,
    MessageDeleted,
    UserTyping,
    UserStoppedTyping,
    UserOnline,
    UserOffline,
    UserStatusChanged,
}

impl ChatEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatEventType::MessageSent => "MESSAGE_SENT",
            ChatEventType::MessageDelivered => "MESSAGE_DELIVERED",
            ChatEventType::MessageSeen => "MESSAGE_SEEN",
            ChatEventType::MessageEdited => "MESSAGE_EDITED",
            ChatEventType::MessageDeleted => "MESSAGE_DELETED",
            ChatEventType::UserTyping => "USER_TYPING",
            ChatEventType::UserStoppedTyping => "USER_STOPPED_TYPING",
            ChatEventType::UserOnline => "USER_ONLINE",
            ChatEventType::UserOffline => "USER_OFFLINE",
            ChatEventType::UserStatusChanged => "USER_STATUS_CHANGED",
        }
    }
}

impl std::fmt::Display for ChatEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChatEventPayload {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            ChatEventPayload::MessageSent(_) => ChatEventType::MessageSent,
            ChatEventPayload::MessageDelivered(_) => ChatEventType::MessageDelivered,
            ChatEventPayload::MessageSeen(_) => ChatEventType::MessageSeen,
            ChatEventPayload::MessageEdited(_) => ChatEventType::MessageEdited,
            ChatEventPayload::MessageDeleted(_) => ChatEventType::MessageDeleted,
            ChatEventPayload::UserTyping(_) => ChatEventType::UserTyping,
            ChatEventPayload::UserStoppedTyping(_) => ChatEventType::UserStoppedTyping,
            ChatEventPayload::UserOnline(_) => ChatEventType::UserOnline,
            ChatEventPayload::UserOffline(_) => ChatEventType::UserOffline,
            ChatEventPayload::UserStatusChanged(_) => ChatEventType::UserStatusChanged,
        }
    }

    /// Topic this payload is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            ChatEventPayload::MessageSent(_)
            | ChatEventPayload::MessageDelivered(_)
            | ChatEventPayload::MessageSeen(_)
            | ChatEventPayload::MessageEdited(_)
            | ChatEventPayload::MessageDeleted(_) => topics::MESSAGE_EVENTS,

            ChatEventPayload::UserTyping(_) | ChatEventPayload::UserStoppedTyping(_) => {
                topics::TYPING_EVENTS
            }

            ChatEventPayload::UserOnline(_)
            | ChatEventPayload::UserOffline(_)
            | ChatEventPayload::UserStatusChanged(_) => topics::PRESENCE_EVENTS,
        }
    }

    /// (originator, target) pair implied by the payload.
    ///
    /// Sent/edited/deleted target the recipient; delivered/seen travel back
    /// to the original sender; typing targets the peer; presence targets
    /// nobody in particular and reuses the user id.
    pub fn participants(&self) -> (&str, &str) {
        match self {
            ChatEventPayload::MessageSent(m) | ChatEventPayload::MessageEdited(m) => {
                (&m.sender_id, &m.recipient_id)
            }
            ChatEventPayload::MessageDeleted(d) => (&d.sender_id, &d.recipient_id),
            ChatEventPayload::MessageDelivered(u) | ChatEventPayload::MessageSeen(u) => {
                (&u.recipient_id, &u.sender_id)
            }
            ChatEventPayload::UserTyping(t) | ChatEventPayload::UserStoppedTyping(t) => {
                (&t.user_id, &t.target_user_id)
            }
            ChatEventPayload::UserOnline(p)
            | ChatEventPayload::UserOffline(p)
            | ChatEventPayload::UserStatusChanged(p) => (&p.user_id, &p.user_id),
        }
    }
}
