use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{glob_match, EphemeralStore};
use crate::error::AppResult;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// TTL map on tokio's clock, so paused-time tests can step past expiry
#[derive(Clone, Default)]
pub struct InMemoryEphemeralStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl InMemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let value = self.entries.get(key).map(|e| (e.is_live(now), e.value.clone()));
        match value {
            Some((true, v)) => Some(v),
            Some((false, _)) => {
                self.entries.remove_if(key, |_, e| !e.is_live(now));
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl EphemeralStore for InMemoryEphemeralStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn get_many(&self, keys: &[String]) -> AppResult<Vec<Option<String>>> {
        Ok(keys.iter().map(|k| self.live_value(k)).collect())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> AppResult<Vec<String>> {
        let now = Instant::now();
        self.entries.retain(|_, e| e.is_live(now));
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = InMemoryEphemeralStore::new();
        store
            .set_with_ttl("presence:u1", "{}", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(store.get("presence:u1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.get("presence:u1").await.unwrap().as_deref(), Some("{}"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("presence:u1").await.unwrap().is_none());
        assert!(store.scan("presence:*").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewrite_refreshes_ttl() {
        let store = InMemoryEphemeralStore::new();
        let ttl = Duration::from_secs(10);
        store.set_with_ttl("k", "a", ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        store.set_with_ttl("k", "b", ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_get_many_preserves_positions() {
        let store = InMemoryEphemeralStore::new();
        let ttl = Duration::from_secs(60);
        store.set_with_ttl("a", "1", ttl).await.unwrap();
        store.set_with_ttl("c", "3", ttl).await.unwrap();

        let keys = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        let values = store.get_many(&keys).await.unwrap();
        assert_eq!(values, vec![Some("3".into()), None, Some("1".into())]);
    }

    #[tokio::test]
    async fn test_scan_and_delete() {
        let store = InMemoryEphemeralStore::new();
        let ttl = Duration::from_secs(60);
        store.set_with_ttl("presence:u1", "x", ttl).await.unwrap();
        store.set_with_ttl("presence:u2", "x", ttl).await.unwrap();
        store.set_with_ttl("typing:u1_u2:u1", "x", ttl).await.unwrap();

        assert_eq!(
            store.scan("presence:*").await.unwrap(),
            vec!["presence:u1".to_string(), "presence:u2".to_string()]
        );

        store.delete("presence:u1").await.unwrap();
        assert_eq!(store.scan("presence:*").await.unwrap().len(), 1);
    }
}
