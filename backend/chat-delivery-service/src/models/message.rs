use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use event_schema::{ChatMessage, MessageStatus, MessageType};

use crate::conversation::conversation_key;

/// A message as submitted, before the store fills identity and timestamps
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub message_id: Option<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub status: Option<MessageStatus>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reply_to_message_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl NewMessage {
    pub fn new(
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Fill defaults: UUID id, `now` timestamps, `sent` status.
    ///
    /// Timestamps are truncated to microseconds, the precision Postgres keeps.
    pub fn materialize(self, now: DateTime<Utc>) -> ChatMessage {
        let now = now.trunc_subsecs(6);
        let timestamp = self.timestamp.map(|t| t.trunc_subsecs(6)).unwrap_or(now);
        ChatMessage {
            message_id: self
                .message_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            conversation_key: conversation_key(&self.sender_id, &self.recipient_id),
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            content: self.content,
            message_type: self.message_type,
            status: self.status.unwrap_or(MessageStatus::Sent),
            timestamp,
            reply_to_message_id: self.reply_to_message_id,
            is_edited: false,
            edited_at: None,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Whether a repeated append carries the same message as the stored row
pub fn is_same_submission(stored: &ChatMessage, incoming: &ChatMessage) -> bool {
    stored.sender_id == incoming.sender_id
        && stored.recipient_id == incoming.recipient_id
        && stored.content == incoming.content
}

/// Newest first; equal timestamps fall back to message id, descending
pub fn sort_newest_first(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.message_id.cmp(&a.message_id))
    });
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub message_id: Option<String>,
    pub recipient_id: String,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub reply_to_message_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SendMessageRequest {
    pub fn into_new_message(self, sender_id: &str) -> NewMessage {
        NewMessage {
            message_id: self.message_id,
            sender_id: sender_id.to_string(),
            recipient_id: self.recipient_id,
            content: self.content,
            message_type: self.message_type,
            status: None,
            timestamp: None,
            reply_to_message_id: self.reply_to_message_id,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// The other participant of the conversation
    pub peer_id: String,
    pub status: MessageStatus,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub peer_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BeforeQuery {
    pub timestamp: DateTime<Utc>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
