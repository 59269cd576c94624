//! Durable, ordered message storage.
//!
//! Messages are partitioned by conversation key and clustered by
//! `(timestamp DESC, message_id)`, so "latest N" and "older than T" are
//! range reads on a single partition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::models::{ChatMessage, MessageStatus, NewMessage};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryMessageRepository;
pub use postgres::PgMessageRepository;

/// Result of a conditional status write
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    /// The row as stored after the call
    pub message: ChatMessage,
    /// False when the stored status was already at or past the request
    pub advanced: bool,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Store a new message, filling id, timestamps and status when absent.
    ///
    /// Appending an existing `(conversation_key, message_id)` never creates a
    /// second row: the stored row is returned when sender, recipient and
    /// content match, `AlreadyExists` otherwise.
    async fn append(&self, message: NewMessage) -> AppResult<ChatMessage>;

    /// Newest `limit` messages, newest first
    async fn latest(&self, conversation_key: &str, limit: i64) -> AppResult<Vec<ChatMessage>>;

    /// Up to `limit` messages strictly older than `before`, newest first
    async fn before(
        &self,
        conversation_key: &str,
        before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>>;

    /// All messages with `start <= timestamp <= end`, newest first
    async fn range(
        &self,
        conversation_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<ChatMessage>>;

    async fn find_by_id(
        &self,
        conversation_key: &str,
        message_id: &str,
    ) -> AppResult<Option<ChatMessage>>;

    /// Move the status to `status` only if the stored status may advance to
    /// it. The check and the write are one atomic step, so concurrent
    /// acknowledgements never move a message backwards.
    async fn advance_status(
        &self,
        conversation_key: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> AppResult<StatusChange>;

    async fn edit_content(
        &self,
        conversation_key: &str,
        message_id: &str,
        content: &str,
    ) -> AppResult<ChatMessage>;

    /// Messages addressed to `recipient_id` still in `sent`, newest first
    async fn unread_for_recipient(
        &self,
        recipient_id: &str,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>>;
}
