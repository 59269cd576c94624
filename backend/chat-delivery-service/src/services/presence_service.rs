//! Presence and typing state.
//!
//! Both live only in the ephemeral store under a TTL. A user that stops
//! heartbeating drops to offline once the presence key expires, and a typing
//! indicator that is never cleared disappears after a few seconds.

use chrono::Utc;
use event_schema::{ChatEvent, ChatEventPayload};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::EventPublisher;
use crate::conversation::{checked_key, validate_user_id};
use crate::ephemeral::{keys, EphemeralStore};
use crate::error::{AppError, AppResult};
use crate::models::{PresenceRecord, PresenceStatus, TypingRecord};

#[derive(Clone)]
pub struct PresenceService {
    store: Arc<dyn EphemeralStore>,
    publisher: Arc<dyn EventPublisher>,
    presence_ttl: Duration,
    typing_ttl: Duration,
}

fn encode<T: Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Persistence(format!("encode ephemeral record: {e}")))
}

/// Undecodable entries are treated as absent
fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "skipping undecodable ephemeral record");
            None
        }
    }
}

impl PresenceService {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        publisher: Arc<dyn EventPublisher>,
        presence_ttl: Duration,
        typing_ttl: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            presence_ttl,
            typing_ttl,
        }
    }

    /// Record `user_id` as online or offline and announce it.
    ///
    /// An online update from a device also refreshes that device's session key.
    pub async fn set_presence(
        &self,
        user_id: &str,
        online: bool,
        device_id: Option<&str>,
    ) -> AppResult<PresenceRecord> {
        validate_user_id(user_id)?;
        let now = Utc::now();
        let record = PresenceRecord {
            user_id: user_id.to_string(),
            online,
            last_seen: now,
            status: if online {
                PresenceStatus::Online
            } else {
                PresenceStatus::Offline
            },
            device_id: device_id.map(str::to_string),
            updated_at: now,
        };
        self.write_presence(&record).await?;

        if let Some(device_id) = device_id {
            let key = keys::device_session(user_id, device_id);
            if online {
                self.store
                    .set_with_ttl(&key, &now.to_rfc3339(), self.presence_ttl)
                    .await?;
            } else {
                self.store.delete(&key).await?;
            }
        }

        let payload = if online {
            ChatEventPayload::UserOnline(record.clone())
        } else {
            ChatEventPayload::UserOffline(record.clone())
        };
        self.publish(payload).await?;
        Ok(record)
    }

    /// Change the advertised status label, keeping the rest of the record
    pub async fn set_status(
        &self,
        user_id: &str,
        status: PresenceStatus,
    ) -> AppResult<PresenceRecord> {
        let mut record = self.get_presence(user_id).await?;
        let now = Utc::now();
        record.status = status;
        record.online = status.is_reachable();
        record.last_seen = now;
        record.updated_at = now;
        self.write_presence(&record).await?;

        self.publish(ChatEventPayload::UserStatusChanged(record.clone()))
            .await?;
        Ok(record)
    }

    /// Extend the presence TTL of a connected user without announcing anything.
    ///
    /// Called from the live session heartbeat. A stored label that still
    /// means reachable is kept; otherwise the user is put back to online.
    pub async fn refresh(&self, user_id: &str) -> AppResult<()> {
        let mut record = self.get_presence(user_id).await?;
        let now = Utc::now();
        if !record.status.is_reachable() && record.status != PresenceStatus::Invisible {
            record.status = PresenceStatus::Online;
        }
        record.online = record.status.is_reachable();
        record.last_seen = now;
        record.updated_at = now;
        self.write_presence(&record).await
    }

    /// Stored record, or a synthesized offline one when none is live
    pub async fn get_presence(&self, user_id: &str) -> AppResult<PresenceRecord> {
        validate_user_id(user_id)?;
        let key = keys::presence(user_id);
        let record = self
            .store
            .get(&key)
            .await?
            .and_then(|raw| decode::<PresenceRecord>(&key, &raw));
        Ok(record.unwrap_or_else(|| PresenceRecord::offline(user_id, Utc::now())))
    }

    /// Presence for every id, in input order
    pub async fn get_presences(&self, user_ids: &[String]) -> AppResult<Vec<PresenceRecord>> {
        for user_id in user_ids {
            validate_user_id(user_id)?;
        }
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let presence_keys: Vec<String> = user_ids.iter().map(|u| keys::presence(u)).collect();
        let values = self.store.get_many(&presence_keys).await?;
        let now = Utc::now();

        Ok(user_ids
            .iter()
            .zip(presence_keys.iter().zip(values))
            .map(|(user_id, (key, raw))| {
                raw.and_then(|raw| decode::<PresenceRecord>(key, &raw))
                    .unwrap_or_else(|| PresenceRecord::offline(user_id.as_str(), now))
            })
            .collect())
    }

    /// Start or stop `user_id` typing toward `target_user_id`
    pub async fn set_typing(
        &self,
        user_id: &str,
        target_user_id: &str,
        typing: bool,
    ) -> AppResult<TypingRecord> {
        let conversation_key = checked_key(user_id, target_user_id)?;
        let key = keys::typing(&conversation_key, user_id);
        let record = TypingRecord {
            user_id: user_id.to_string(),
            target_user_id: target_user_id.to_string(),
            conversation_key,
            typing,
            timestamp: Utc::now(),
        };

        if typing {
            self.store
                .set_with_ttl(&key, &encode(&record)?, self.typing_ttl)
                .await?;
        } else {
            self.store.delete(&key).await?;
        }

        let payload = if typing {
            ChatEventPayload::UserTyping(record.clone())
        } else {
            ChatEventPayload::UserStoppedTyping(record.clone())
        };
        self.publish(payload).await?;
        Ok(record)
    }

    /// Live typing indicators aimed at `user_id`
    pub async fn get_typing_indicators(&self, user_id: &str) -> AppResult<Vec<TypingRecord>> {
        validate_user_id(user_id)?;

        let mut candidates = BTreeSet::new();
        for pattern in keys::typing_patterns_for(user_id) {
            for key in self.store.scan(&pattern).await? {
                if keys::typer_of(&key) != Some(user_id) {
                    candidates.insert(key);
                }
            }
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let typing_keys: Vec<String> = candidates.into_iter().collect();
        let values = self.store.get_many(&typing_keys).await?;
        Ok(typing_keys
            .iter()
            .zip(values)
            .filter_map(|(key, raw)| raw.and_then(|raw| decode::<TypingRecord>(key, &raw)))
            .filter(|record| record.typing && record.target_user_id == user_id)
            .collect())
    }

    /// Every user currently recorded as online. Scans the whole keyspace.
    pub async fn online_user_ids(&self) -> AppResult<Vec<String>> {
        let presence_keys = self.store.scan(&keys::presence_pattern()).await?;
        if presence_keys.is_empty() {
            return Ok(Vec::new());
        }
        let values = self.store.get_many(&presence_keys).await?;
        let mut online: Vec<String> = presence_keys
            .iter()
            .zip(values)
            .filter_map(|(key, raw)| raw.and_then(|raw| decode::<PresenceRecord>(key, &raw)))
            .filter(|record| record.online)
            .map(|record| record.user_id)
            .collect();
        online.sort();
        Ok(online)
    }

    async fn write_presence(&self, record: &PresenceRecord) -> AppResult<()> {
        self.store
            .set_with_ttl(
                &keys::presence(&record.user_id),
                &encode(record)?,
                self.presence_ttl,
            )
            .await
    }

    async fn publish(&self, payload: ChatEventPayload) -> AppResult<()> {
        let event = ChatEvent::new(crate::SERVICE_NAME, payload);
        self.publisher.publish(&event).await.map_err(|e| {
            tracing::warn!(
                event_id = %event.event_id,
                event_type = event.event_type.as_str(),
                user_id = %event.user_id,
                error = %e,
                "state written, event not published"
            );
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryEventBus;
    use crate::ephemeral::InMemoryEphemeralStore;
    use event_schema::topics;

    fn service() -> (PresenceService, Arc<InMemoryEphemeralStore>, InMemoryEventBus) {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let bus = InMemoryEventBus::new();
        let service = PresenceService::new(
            store.clone(),
            Arc::new(bus.clone()),
            Duration::from_secs(300),
            Duration::from_secs(10),
        );
        (service, store, bus)
    }

    #[tokio::test(start_paused = true)]
    async fn test_presence_expires_to_offline() {
        let (service, _store, bus) = service();

        service.set_presence("u1", true, None).await.unwrap();
        assert!(service.get_presence("u1").await.unwrap().online);
        assert_eq!(bus.published_on(topics::PRESENCE_EVENTS).await.len(), 1);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(service.get_presence("u1").await.unwrap().online);

        tokio::time::advance(Duration::from_secs(2)).await;
        let record = service.get_presence("u1").await.unwrap();
        assert!(!record.online);
        assert_eq!(record.status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn test_device_session_key_follows_presence() {
        let (service, store, _bus) = service();

        service.set_presence("u1", true, Some("phone")).await.unwrap();
        assert!(store.get("user_sessions:u1:phone").await.unwrap().is_some());

        service.set_presence("u1", false, Some("phone")).await.unwrap();
        assert!(store.get("user_sessions:u1:phone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let (service, _store, _bus) = service();
        service.set_presence("b", true, None).await.unwrap();

        let ids = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        let records = service.get_presences(&ids).await.unwrap();
        let got: Vec<(&str, bool)> = records
            .iter()
            .map(|r| (r.user_id.as_str(), r.online))
            .collect();
        assert_eq!(got, vec![("c", false), ("b", true), ("a", false)]);
    }

    #[tokio::test]
    async fn test_status_label_is_announced() {
        let (service, _store, bus) = service();
        service.set_presence("u1", true, None).await.unwrap();

        let record = service.set_status("u1", PresenceStatus::Busy).await.unwrap();
        assert!(record.online);
        assert_eq!(
            service.get_presence("u1").await.unwrap().status,
            PresenceStatus::Busy
        );

        let hidden = service
            .set_status("u1", PresenceStatus::Invisible)
            .await
            .unwrap();
        assert!(!hidden.online);

        let events = bus.published_on(topics::PRESENCE_EVENTS).await;
        assert!(matches!(
            events.last().map(|p| &p.event.payload),
            Some(ChatEventPayload::UserStatusChanged(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_expires_without_stop() {
        let (service, _store, bus) = service();

        service.set_typing("u1", "u2", true).await.unwrap();
        let indicators = service.get_typing_indicators("u2").await.unwrap();
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].user_id, "u1");
        assert_eq!(indicators[0].conversation_key, "u1_u2");

        // The typer does not see their own indicator
        assert!(service.get_typing_indicators("u1").await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(service.get_typing_indicators("u2").await.unwrap().is_empty());

        let typing = bus.published_on(topics::TYPING_EVENTS).await;
        assert_eq!(typing.len(), 1);
        assert_eq!(typing[0].partition_key, "u2");
    }

    #[tokio::test]
    async fn test_typing_stop_clears_indicator() {
        let (service, _store, bus) = service();

        service.set_typing("u3", "u2", true).await.unwrap();
        service.set_typing("u3", "u2", false).await.unwrap();
        assert!(service.get_typing_indicators("u2").await.unwrap().is_empty());

        let typing = bus.published_on(topics::TYPING_EVENTS).await;
        assert!(matches!(
            typing[1].event.payload,
            ChatEventPayload::UserStoppedTyping(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_extends_without_event() {
        let (service, _store, bus) = service();
        service.set_status("u1", PresenceStatus::Away).await.unwrap();
        let published = bus.published().await.len();

        tokio::time::advance(Duration::from_secs(200)).await;
        service.refresh("u1").await.unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;

        let record = service.get_presence("u1").await.unwrap();
        assert!(record.online);
        assert_eq!(record.status, PresenceStatus::Away);
        assert_eq!(bus.published().await.len(), published);
    }

    #[tokio::test]
    async fn test_online_user_ids_skips_offline_records() {
        let (service, _store, _bus) = service();
        service.set_presence("u2", true, None).await.unwrap();
        service.set_presence("u1", true, None).await.unwrap();
        service.set_presence("u3", false, None).await.unwrap();

        assert_eq!(service.online_user_ids().await.unwrap(), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_after_write() {
        let (service, _store, bus) = service();
        bus.set_unavailable(true);

        let err = service.set_presence("u1", true, None).await.unwrap_err();
        assert!(matches!(err, AppError::DeliveryFailed(_)));
        assert!(service.get_presence("u1").await.unwrap().online);
    }
}
