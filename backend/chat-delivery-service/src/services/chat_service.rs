//! # Chat Service
//!
//! Message mutations follow write-then-publish: the row is stored first and
//! the matching event is handed to the bus second. There is no outbox. When
//! the publish fails the caller gets `DeliveryFailed` while the row stays;
//! resending the same `message_id` is idempotent and publishes again.
//!
//! Status moves forward only (`sent -> delivered -> seen`, `failed` from
//! anywhere). A stale acknowledgement returns the current row untouched.

use chrono::{DateTime, Utc};
use event_schema::{ChatEvent, ChatEventPayload, MessageStatusUpdate};
use std::sync::Arc;

use crate::bus::EventPublisher;
use crate::config::Config;
use crate::conversation::checked_key;
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, MessageStatus, MessageType, NewMessage};
use crate::repository::MessageRepository;

#[derive(Clone)]
pub struct ChatService {
    repository: Arc<dyn MessageRepository>,
    publisher: Arc<dyn EventPublisher>,
    config: Arc<Config>,
}

impl ChatService {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        publisher: Arc<dyn EventPublisher>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            repository,
            publisher,
            config,
        }
    }

    pub async fn send_message(&self, message: NewMessage) -> AppResult<ChatMessage> {
        checked_key(&message.sender_id, &message.recipient_id)?;
        if message.message_type == MessageType::Text && message.content.trim().is_empty() {
            return Err(AppError::Validation("text message content is empty".into()));
        }

        let stored = self.repository.append(message).await?;
        tracing::debug!(
            message_id = %stored.message_id,
            conversation_key = %stored.conversation_key,
            "message stored"
        );

        self.publish(
            &stored.message_id,
            ChatEventPayload::MessageSent(stored.clone()),
        )
        .await?;
        Ok(stored)
    }

    pub async fn get_messages(
        &self,
        user_id: &str,
        peer_id: &str,
        limit: Option<i64>,
    ) -> AppResult<Vec<ChatMessage>> {
        let key = checked_key(user_id, peer_id)?;
        self.repository
            .latest(&key, self.config.page_limit(limit))
            .await
    }

    pub async fn get_messages_before(
        &self,
        user_id: &str,
        peer_id: &str,
        before: DateTime<Utc>,
        limit: Option<i64>,
    ) -> AppResult<Vec<ChatMessage>> {
        let key = checked_key(user_id, peer_id)?;
        self.repository
            .before(&key, before, self.config.page_limit(limit))
            .await
    }

    pub async fn get_history(
        &self,
        user_id: &str,
        peer_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<ChatMessage>> {
        if start > end {
            return Err(AppError::Validation(format!(
                "history window starts after it ends ({start} > {end})"
            )));
        }
        let key = checked_key(user_id, peer_id)?;
        self.repository.range(&key, start, end).await
    }

    /// Messages addressed to `user_id` that nobody acknowledged yet
    pub async fn get_unread(&self, user_id: &str) -> AppResult<Vec<ChatMessage>> {
        crate::conversation::validate_user_id(user_id)?;
        self.repository
            .unread_for_recipient(user_id, self.config.unread_limit)
            .await
    }

    /// Apply a status change requested by `user_id`.
    ///
    /// `delivered` and `seen` come from the recipient; `sending` and `failed`
    /// from the sender. Only `delivered` and `seen` are published.
    pub async fn update_message_status(
        &self,
        user_id: &str,
        peer_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> AppResult<ChatMessage> {
        let key = checked_key(user_id, peer_id)?;
        let current = self
            .repository
            .find_by_id(&key, message_id)
            .await?
            .ok_or_else(|| AppError::not_found_message(message_id))?;

        let allowed = match status {
            MessageStatus::Delivered | MessageStatus::Seen => current.recipient_id == user_id,
            MessageStatus::Sending | MessageStatus::Sent | MessageStatus::Failed => {
                current.sender_id == user_id
            }
        };
        if !allowed {
            return Err(AppError::Forbidden(format!(
                "{user_id} cannot mark message {message_id} as {status}"
            )));
        }

        if !current.status.can_advance_to(status) {
            tracing::debug!(
                message_id = %message_id,
                current = %current.status,
                requested = %status,
                "stale status transition ignored"
            );
            return Ok(current);
        }

        // The read above only screens; the write re-checks atomically
        let change = self
            .repository
            .advance_status(&key, message_id, status)
            .await?;
        if !change.advanced {
            tracing::debug!(
                message_id = %message_id,
                current = %change.message.status,
                requested = %status,
                "status already advanced by a concurrent update"
            );
            return Ok(change.message);
        }
        let updated = change.message;

        let payload = match status {
            MessageStatus::Delivered => Some(ChatEventPayload::MessageDelivered(
                MessageStatusUpdate::from(&updated),
            )),
            MessageStatus::Seen => Some(ChatEventPayload::MessageSeen(MessageStatusUpdate::from(
                &updated,
            ))),
            _ => None,
        };
        if let Some(payload) = payload {
            self.publish(message_id, payload).await?;
        }
        Ok(updated)
    }

    /// Replace the content of a message. Only its sender may edit it.
    pub async fn edit_message(
        &self,
        user_id: &str,
        peer_id: &str,
        message_id: &str,
        content: &str,
    ) -> AppResult<ChatMessage> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("edited content is empty".into()));
        }
        let key = checked_key(user_id, peer_id)?;
        let current = self
            .repository
            .find_by_id(&key, message_id)
            .await?
            .ok_or_else(|| AppError::not_found_message(message_id))?;
        if current.sender_id != user_id {
            return Err(AppError::Forbidden(format!(
                "{user_id} is not the sender of message {message_id}"
            )));
        }

        let edited = self
            .repository
            .edit_content(&key, message_id, content)
            .await?;
        self.publish(message_id, ChatEventPayload::MessageEdited(edited.clone()))
            .await?;
        Ok(edited)
    }

    async fn publish(&self, message_id: &str, payload: ChatEventPayload) -> AppResult<()> {
        let event = ChatEvent::new(crate::SERVICE_NAME, payload);
        self.publisher.publish(&event).await.map_err(|e| {
            tracing::warn!(
                message_id = %message_id,
                event_id = %event.event_id,
                event_type = event.event_type.as_str(),
                error = %e,
                "event not published after store write"
            );
            AppError::DeliveryFailed(format!("message {message_id} stored, event not published: {e}"))
        })
    }
}
