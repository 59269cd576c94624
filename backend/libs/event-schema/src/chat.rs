//! Records carried inside chat events.
//!
//! These are the wire shapes shared by the chat-delivery-service and any
//! downstream consumer of the chat topics (notification-service reads
//! `message-events` independently).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of content a message carries. Media lives behind URLs in `metadata`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    File,
    Audio,
    Location,
    Contact,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::File => "file",
            MessageType::Audio => "audio",
            MessageType::Location => "location",
            MessageType::Contact => "contact",
            MessageType::System => "system",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "video" => Ok(MessageType::Video),
            "file" => Ok(MessageType::File),
            "audio" => Ok(MessageType::Audio),
            "location" => Ok(MessageType::Location),
            "contact" => Ok(MessageType::Contact),
            "system" => Ok(MessageType::System),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// Delivery lifecycle of a message.
///
/// `Sending -> Sent -> Delivered -> Seen` is the forward path; `Failed` may be
/// entered from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    #[default]
    Sent,
    Delivered,
    Seen,
    Failed,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 5] = [
        MessageStatus::Sending,
        MessageStatus::Sent,
        MessageStatus::Delivered,
        MessageStatus::Seen,
        MessageStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Seen => "seen",
            MessageStatus::Failed => "failed",
        }
    }

    /// Position on the forward path. `Failed` has no rank.
    pub fn rank(&self) -> Option<u8> {
        match self {
            MessageStatus::Sending => Some(0),
            MessageStatus::Sent => Some(1),
            MessageStatus::Delivered => Some(2),
            MessageStatus::Seen => Some(3),
            MessageStatus::Failed => None,
        }
    }

    /// Whether moving from `self` to `next` advances the lifecycle.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        match (self.rank(), next.rank()) {
            (_, None) => *self != MessageStatus::Failed,
            (None, Some(_)) => false,
            (Some(current), Some(next)) => next > current,
        }
    }

    /// Every status a message may hold for a move to `next` to be allowed
    pub fn predecessors(next: MessageStatus) -> Vec<MessageStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_advance_to(next))
            .collect()
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sending" => Ok(MessageStatus::Sending),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "seen" => Ok(MessageStatus::Seen),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// A stored direct message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub conversation_key: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status change of a single message, relayed back to the original sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStatusUpdate {
    pub message_id: String,
    pub conversation_key: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub status: MessageStatus,
    pub updated_at: DateTime<Utc>,
}

impl From<&ChatMessage> for MessageStatusUpdate {
    fn from(message: &ChatMessage) -> Self {
        Self {
            message_id: message.message_id.clone(),
            conversation_key: message.conversation_key.clone(),
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            status: message.status,
            updated_at: message.updated_at,
        }
    }
}

/// Soft removal of a message from the recipient's view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDeletion {
    pub message_id: String,
    pub conversation_key: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub deleted_at: DateTime<Utc>,
}

/// Coarse availability label a user advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    #[default]
    Offline,
    Away,
    Busy,
    Invisible,
}

impl PresenceStatus {
    /// Whether the label means the user accepts live pushes.
    pub fn is_reachable(&self) -> bool {
        matches!(
            self,
            PresenceStatus::Online | PresenceStatus::Away | PresenceStatus::Busy
        )
    }
}

/// Last known presence of a user. Absence of a record means offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
    pub status: PresenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PresenceRecord {
    /// Record returned for users with no live presence entry.
    pub fn offline(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            online: false,
            last_seen: now,
            status: PresenceStatus::Offline,
            device_id: None,
            updated_at: now,
        }
    }
}

/// A user is (or stopped) typing toward another user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingRecord {
    pub user_id: String,
    pub target_user_id: String,
    pub conversation_key: String,
    pub typing: bool,
    pub timestamp: DateTime<Utc>,
}
