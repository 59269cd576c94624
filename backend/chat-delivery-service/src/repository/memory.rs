use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{MessageRepository, StatusChange};
use crate::error::{AppError, AppResult};
use crate::models::{is_same_submission, sort_newest_first, ChatMessage, MessageStatus, NewMessage};

type ClusterKey = (DateTime<Utc>, String);

/// Process-local message store with the same ordering as the Postgres table.
///
/// Used by tests and by single-node development runs.
#[derive(Clone, Default)]
pub struct InMemoryMessageRepository {
    partitions: Arc<DashMap<String, BTreeMap<ClusterKey, ChatMessage>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Persistence` until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("message store unavailable".into()));
        }
        Ok(())
    }

    fn mutate<F, R>(
        &self,
        conversation_key: &str,
        message_id: &str,
        f: F,
    ) -> AppResult<(ChatMessage, R)>
    where
        F: FnOnce(&mut ChatMessage) -> R,
    {
        self.check_available()?;
        let mut partition = self
            .partitions
            .get_mut(conversation_key)
            .ok_or_else(|| AppError::not_found_message(message_id))?;
        let message = partition
            .values_mut()
            .find(|m| m.message_id == message_id)
            .ok_or_else(|| AppError::not_found_message(message_id))?;
        let result = f(message);
        Ok((message.clone(), result))
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: NewMessage) -> AppResult<ChatMessage> {
        self.check_available()?;
        let message = message.materialize(Utc::now());
        let mut partition = self
            .partitions
            .entry(message.conversation_key.clone())
            .or_default();

        if let Some(stored) = partition
            .values()
            .find(|m| m.message_id == message.message_id)
        {
            return if is_same_submission(stored, &message) {
                Ok(stored.clone())
            } else {
                Err(AppError::AlreadyExists(format!(
                    "message {} in {}",
                    message.message_id, message.conversation_key
                )))
            };
        }

        partition.insert(
            (message.timestamp, message.message_id.clone()),
            message.clone(),
        );
        Ok(message)
    }

    async fn latest(&self, conversation_key: &str, limit: i64) -> AppResult<Vec<ChatMessage>> {
        self.check_available()?;
        Ok(self
            .partitions
            .get(conversation_key)
            .map(|p| {
                p.values()
                    .rev()
                    .take(limit.max(0) as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn before(
        &self,
        conversation_key: &str,
        before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>> {
        self.check_available()?;
        // (before, "") is the smallest key at `before`, so the range is strictly older
        Ok(self
            .partitions
            .get(conversation_key)
            .map(|p| {
                p.range(..(before, String::new()))
                    .rev()
                    .take(limit.max(0) as usize)
                    .map(|(_, m)| m.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn range(
        &self,
        conversation_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<ChatMessage>> {
        self.check_available()?;
        Ok(self
            .partitions
            .get(conversation_key)
            .map(|p| {
                p.range((start, String::new())..)
                    .take_while(|((ts, _), _)| *ts <= end)
                    .map(|(_, m)| m.clone())
                    .collect::<Vec<_>>()
            })
            .map(|mut v| {
                v.reverse();
                v
            })
            .unwrap_or_default())
    }

    async fn find_by_id(
        &self,
        conversation_key: &str,
        message_id: &str,
    ) -> AppResult<Option<ChatMessage>> {
        self.check_available()?;
        Ok(self.partitions.get(conversation_key).and_then(|p| {
            p.values()
                .find(|m| m.message_id == message_id)
                .cloned()
        }))
    }

    async fn advance_status(
        &self,
        conversation_key: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> AppResult<StatusChange> {
        let now = Utc::now().trunc_subsecs(6);
        // The partition guard is held across the check and the write
        self.mutate(conversation_key, message_id, |m| {
            let advanced = m.status.can_advance_to(status);
            if advanced {
                m.status = status;
                m.updated_at = now;
            }
            advanced
        })
        .map(|(message, advanced)| StatusChange { message, advanced })
    }

    async fn edit_content(
        &self,
        conversation_key: &str,
        message_id: &str,
        content: &str,
    ) -> AppResult<ChatMessage> {
        let now = Utc::now().trunc_subsecs(6);
        self.mutate(conversation_key, message_id, |m| {
            m.content = content.to_string();
            m.is_edited = true;
            m.edited_at = Some(now);
            m.updated_at = now;
        })
        .map(|(message, ())| message)
    }

    async fn unread_for_recipient(
        &self,
        recipient_id: &str,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>> {
        self.check_available()?;
        let mut unread: Vec<ChatMessage> = self
            .partitions
            .iter()
            .flat_map(|p| {
                p.value()
                    .values()
                    .filter(|m| m.recipient_id == recipient_id && m.status == MessageStatus::Sent)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        sort_newest_first(&mut unread);
        unread.truncate(limit.max(0) as usize);
        Ok(unread)
    }
}
