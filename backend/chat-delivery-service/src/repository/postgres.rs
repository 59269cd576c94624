use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use deadpool_postgres::Pool;
use std::time::Instant;
use tokio_postgres::Row;

use super::{MessageRepository, StatusChange};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{is_same_submission, ChatMessage, MessageStatus, NewMessage};

const COLUMNS: &str = "conversation_key, message_ts, message_id, sender_id, recipient_id, \
     content, message_type, status, reply_to_message_id, is_edited, edited_at, metadata, \
     created_at, updated_at";

/// Message store over the `messages` table
#[derive(Clone)]
pub struct PgMessageRepository {
    db: Pool,
}

impl PgMessageRepository {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }

    async fn query_messages(
        &self,
        operation: &'static str,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> AppResult<Vec<ChatMessage>> {
        let started = Instant::now();
        let client = self.db.get().await?;
        let rows = client.query(sql, params).await?;
        metrics::observe_store_latency(operation, started);
        rows.iter().map(row_to_message).collect()
    }
}

fn row_to_message(row: &Row) -> AppResult<ChatMessage> {
    let message_type: String = row.get("message_type");
    let status: String = row.get("status");
    let metadata: serde_json::Value = row.get("metadata");

    Ok(ChatMessage {
        conversation_key: row.get("conversation_key"),
        timestamp: row.get("message_ts"),
        message_id: row.get("message_id"),
        sender_id: row.get("sender_id"),
        recipient_id: row.get("recipient_id"),
        content: row.get("content"),
        message_type: message_type.parse().map_err(AppError::Persistence)?,
        status: status.parse().map_err(AppError::Persistence)?,
        reply_to_message_id: row.get("reply_to_message_id"),
        is_edited: row.get("is_edited"),
        edited_at: row.get("edited_at"),
        metadata: match metadata {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: NewMessage) -> AppResult<ChatMessage> {
        let started = Instant::now();
        let message = message.materialize(Utc::now());
        let metadata = serde_json::Value::Object(message.metadata.clone());
        let client = self.db.get().await?;

        let sql = format!(
            "INSERT INTO messages ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (conversation_key, message_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = client
            .query_opt(
                &sql,
                &[
                    &message.conversation_key,
                    &message.timestamp,
                    &message.message_id,
                    &message.sender_id,
                    &message.recipient_id,
                    &message.content,
                    &message.message_type.as_str(),
                    &message.status.as_str(),
                    &message.reply_to_message_id,
                    &message.is_edited,
                    &message.edited_at,
                    &metadata,
                    &message.created_at,
                    &message.updated_at,
                ],
            )
            .await?;
        metrics::observe_store_latency("append", started);

        if let Some(row) = inserted {
            return row_to_message(&row);
        }

        let stored = self
            .find_by_id(&message.conversation_key, &message.message_id)
            .await?
            .ok_or_else(|| {
                AppError::Persistence(format!(
                    "message {} conflicted but could not be read back",
                    message.message_id
                ))
            })?;

        if is_same_submission(&stored, &message) {
            tracing::debug!(
                message_id = %stored.message_id,
                conversation_key = %stored.conversation_key,
                "duplicate append, returning stored message"
            );
            Ok(stored)
        } else {
            Err(AppError::AlreadyExists(format!(
                "message {} in {}",
                message.message_id, message.conversation_key
            )))
        }
    }

    async fn latest(&self, conversation_key: &str, limit: i64) -> AppResult<Vec<ChatMessage>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM messages WHERE conversation_key = $1 \
             ORDER BY message_ts DESC, message_id DESC LIMIT $2"
        );
        self.query_messages("latest", &sql, &[&conversation_key, &limit])
            .await
    }

    async fn before(
        &self,
        conversation_key: &str,
        before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM messages WHERE conversation_key = $1 AND message_ts < $2 \
             ORDER BY message_ts DESC, message_id DESC LIMIT $3"
        );
        self.query_messages("before", &sql, &[&conversation_key, &before, &limit])
            .await
    }

    async fn range(
        &self,
        conversation_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<ChatMessage>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM messages WHERE conversation_key = $1 \
             AND message_ts >= $2 AND message_ts <= $3 \
             ORDER BY message_ts DESC, message_id DESC"
        );
        self.query_messages("range", &sql, &[&conversation_key, &start, &end])
            .await
    }

    async fn find_by_id(
        &self,
        conversation_key: &str,
        message_id: &str,
    ) -> AppResult<Option<ChatMessage>> {
        let client = self.db.get().await?;
        let sql = format!(
            "SELECT {COLUMNS} FROM messages WHERE conversation_key = $1 AND message_id = $2"
        );
        let row = client
            .query_opt(&sql, &[&conversation_key, &message_id])
            .await?;
        row.as_ref().map(row_to_message).transpose()
    }

    async fn advance_status(
        &self,
        conversation_key: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> AppResult<StatusChange> {
        let started = Instant::now();
        let client = self.db.get().await?;
        let sql = format!(
            "UPDATE messages SET status = $3, updated_at = $4 \
             WHERE conversation_key = $1 AND message_id = $2 AND status = ANY($5) \
             RETURNING {COLUMNS}"
        );
        let predecessors: Vec<&str> = MessageStatus::predecessors(status)
            .iter()
            .map(|s| s.as_str())
            .collect();
        let now = Utc::now().trunc_subsecs(6);
        let row = client
            .query_opt(
                &sql,
                &[
                    &conversation_key,
                    &message_id,
                    &status.as_str(),
                    &now,
                    &predecessors,
                ],
            )
            .await?;
        metrics::observe_store_latency("advance_status", started);

        if let Some(row) = row {
            return Ok(StatusChange {
                message: row_to_message(&row)?,
                advanced: true,
            });
        }

        // Either missing or already at or past `status`
        let current = self
            .find_by_id(conversation_key, message_id)
            .await?
            .ok_or_else(|| AppError::not_found_message(message_id))?;
        Ok(StatusChange {
            message: current,
            advanced: false,
        })
    }

    async fn edit_content(
        &self,
        conversation_key: &str,
        message_id: &str,
        content: &str,
    ) -> AppResult<ChatMessage> {
        let client = self.db.get().await?;
        let sql = format!(
            "UPDATE messages SET content = $3, is_edited = TRUE, edited_at = $4, updated_at = $4 \
             WHERE conversation_key = $1 AND message_id = $2 RETURNING {COLUMNS}"
        );
        let now = Utc::now().trunc_subsecs(6);
        let row = client
            .query_opt(&sql, &[&conversation_key, &message_id, &content, &now])
            .await?
            .ok_or_else(|| AppError::not_found_message(message_id))?;
        row_to_message(&row)
    }

    async fn unread_for_recipient(
        &self,
        recipient_id: &str,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM messages WHERE recipient_id = $1 AND status = 'sent' \
             ORDER BY message_ts DESC, message_id DESC LIMIT $2"
        );
        self.query_messages("unread", &sql, &[&recipient_id, &limit])
            .await
    }
}
