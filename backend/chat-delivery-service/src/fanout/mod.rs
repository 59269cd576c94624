//! Online-aware delivery of consumed chat events.
//!
//! For each event the engine decides between a live push to a session held
//! by this instance and doing nothing (the recipient pulls on reconnect).
//! Pushing never advances message status; only client acknowledgements do.

use chrono::Utc;
use event_schema::{ChatEvent, ChatEventPayload, PresenceRecord};
use std::time::Duration;
use uuid::Uuid;

use crate::metrics;
use crate::websocket::message_types::WsOutboundEvent;
use crate::websocket::SessionRegistry;

pub mod deduplicator;

pub use deduplicator::EventDeduplicator;

/// What the engine did with one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOutcome {
    /// Written to this many local sessions
    Pushed(usize),
    /// Target is live on another instance; that instance pushes
    Remote,
    /// Target has no live session anywhere; left for pull
    Offline,
    /// Already handled inside the dedup window
    Duplicate,
}

impl FanoutOutcome {
    fn label(&self) -> &'static str {
        match self {
            FanoutOutcome::Pushed(_) => "pushed",
            FanoutOutcome::Remote => "remote",
            FanoutOutcome::Offline => "offline",
            FanoutOutcome::Duplicate => "duplicate",
        }
    }
}

pub struct FanoutEngine {
    registry: SessionRegistry,
    dedup: EventDeduplicator<Uuid>,
}

impl FanoutEngine {
    pub fn new(registry: SessionRegistry, dedup_ttl: Duration) -> Self {
        Self {
            registry,
            dedup: EventDeduplicator::new(dedup_ttl),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub async fn handle(&self, event: ChatEvent) -> FanoutOutcome {
        let event_type = event.event_type;
        let outcome = if self.dedup.process_or_skip(event.event_id) {
            self.dispatch(event).await
        } else {
            FanoutOutcome::Duplicate
        };
        metrics::record_fanout(event_type.as_str(), outcome.label());
        outcome
    }

    async fn dispatch(&self, event: ChatEvent) -> FanoutOutcome {
        match event.payload {
            ChatEventPayload::MessageSent(message) => {
                let recipient = message.recipient_id.clone();
                let outcome = self
                    .deliver(&recipient, WsOutboundEvent::MessageNew { message })
                    .await;
                if outcome == FanoutOutcome::Offline {
                    tracing::debug!(
                        event_id = %event.event_id,
                        recipient_id = %recipient,
                        "recipient offline, message left for pull"
                    );
                }
                outcome
            }

            ChatEventPayload::MessageDelivered(update) | ChatEventPayload::MessageSeen(update) => {
                // Relayed to the original sender
                let sender = update.sender_id.clone();
                self.deliver(
                    &sender,
                    WsOutboundEvent::MessageStatus {
                        message_id: update.message_id,
                        conversation_key: update.conversation_key,
                        status: update.status,
                        timestamp: update.updated_at,
                    },
                )
                .await
            }

            ChatEventPayload::MessageEdited(message) => {
                let recipient = message.recipient_id.clone();
                self.deliver(&recipient, WsOutboundEvent::MessageEdited { message })
                    .await
            }

            ChatEventPayload::MessageDeleted(deletion) => {
                let recipient = deletion.recipient_id.clone();
                self.deliver(
                    &recipient,
                    WsOutboundEvent::MessageDeleted {
                        message_id: deletion.message_id,
                        conversation_key: deletion.conversation_key,
                        timestamp: deletion.deleted_at,
                    },
                )
                .await
            }

            ChatEventPayload::UserTyping(typing) | ChatEventPayload::UserStoppedTyping(typing) => {
                // Typing is only useful live; dropped when the target is away
                let target = typing.target_user_id.clone();
                self.deliver(
                    &target,
                    WsOutboundEvent::Typing {
                        user_id: typing.user_id,
                        conversation_key: typing.conversation_key,
                        typing: typing.typing,
                        timestamp: typing.timestamp,
                    },
                )
                .await
            }

            ChatEventPayload::UserOnline(record)
            | ChatEventPayload::UserOffline(record)
            | ChatEventPayload::UserStatusChanged(record) => self.relay_presence(record).await,
        }
    }

    async fn deliver(&self, user_id: &str, outbound: WsOutboundEvent) -> FanoutOutcome {
        if !self.registry.has_local_session(user_id) {
            return self.absent_outcome(user_id).await;
        }
        let Some(payload) = outbound.to_json() else {
            return FanoutOutcome::Pushed(0);
        };

        match self.registry.push(user_id, &payload).await {
            // Every local session was evicted during the push
            0 => self.absent_outcome(user_id).await,
            n => FanoutOutcome::Pushed(n),
        }
    }

    async fn absent_outcome(&self, user_id: &str) -> FanoutOutcome {
        if self.registry.is_online(user_id).await {
            FanoutOutcome::Remote
        } else {
            FanoutOutcome::Offline
        }
    }

    /// Contact lists live elsewhere, so presence goes to every local session
    /// other than the subject's own.
    async fn relay_presence(&self, record: PresenceRecord) -> FanoutOutcome {
        let subject = record.user_id.clone();
        let outbound = WsOutboundEvent::Presence {
            user_id: record.user_id,
            online: record.online,
            status: record.status,
            timestamp: record.updated_at,
        };
        let Some(payload) = outbound.to_json() else {
            return FanoutOutcome::Pushed(0);
        };
        FanoutOutcome::Pushed(self.registry.broadcast(&payload, Some(&subject)).await)
    }

    /// Periodic housekeeping for the dedup window
    pub fn spawn_dedup_cleanup(self: &std::sync::Arc<Self>, every: Duration) {
        let engine = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = engine.dedup.cleanup_expired();
                tracing::trace!(removed, at = %Utc::now(), "dedup cleanup tick");
            }
        });
    }
}
