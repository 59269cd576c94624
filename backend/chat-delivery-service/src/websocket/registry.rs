use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use uuid::Uuid;

use crate::ephemeral::{keys, EphemeralStore};
use crate::metrics;

/// Unique identifier for one live connection
///
/// A user may hold several sessions (devices, tabs); each is removed by id
/// when its connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct LiveSession {
    id: SessionId,
    sender: mpsc::Sender<String>,
}

/// Which users hold a live session, locally and across instances.
///
/// Local state is a sharded map (user id -> sessions), so concurrent
/// connect/disconnect/push never take a registry-wide lock. Cross-process
/// state is one TTL key per (user, instance), refreshed by the session
/// heartbeat; an instance only ever writes or deletes its own key.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Vec<LiveSession>>>,
    active: Arc<AtomicUsize>,
    instance_id: String,
    store: Arc<dyn EphemeralStore>,
    session_ttl: Duration,
    push_timeout: Duration,
    buffer: usize,
}

impl SessionRegistry {
    pub fn new(
        instance_id: impl Into<String>,
        store: Arc<dyn EphemeralStore>,
        session_ttl: Duration,
        push_timeout: Duration,
        buffer: usize,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            active: Arc::new(AtomicUsize::new(0)),
            instance_id: instance_id.into(),
            store,
            session_ttl,
            push_timeout,
            buffer: buffer.max(1),
        }
    }

    /// Register a live session for `user_id`.
    ///
    /// Returns the session id (used for removal) and the receiving end of the
    /// session's bounded outbound queue.
    pub async fn add(&self, user_id: &str) -> (SessionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let session_id = SessionId::new();

        // Counted under the shard guard so a racing removal never underflows
        let (count, active) = {
            let mut entry = self.sessions.entry(user_id.to_string()).or_default();
            entry.push(LiveSession {
                id: session_id,
                sender: tx,
            });
            (entry.len(), self.active.fetch_add(1, Ordering::SeqCst) + 1)
        };
        metrics::set_active_sessions(active);

        tracing::debug!(
            user_id = %user_id,
            session_id = %session_id,
            sessions = count,
            "session registered"
        );

        self.mark_online(user_id).await;
        (session_id, rx)
    }

    /// Remove one session. This instance's marker is cleared once the
    /// user's last local session is gone; other instances keep theirs.
    pub async fn remove(&self, user_id: &str, session_id: SessionId) {
        let now_empty = self.remove_local(user_id, session_id);
        if now_empty {
            let key = keys::session_online(user_id, &self.instance_id);
            if let Err(e) = self.store.delete(&key).await {
                tracing::warn!(user_id = %user_id, error = %e, "failed to clear online marker");
            }
        }
    }

    /// Extend the cross-process marker; called from the session heartbeat
    pub async fn refresh(&self, user_id: &str) {
        if self.has_local_session(user_id) {
            self.mark_online(user_id).await;
        }
    }

    pub fn has_local_session(&self, user_id: &str) -> bool {
        self.sessions
            .get(user_id)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    /// Local sessions first, then any instance's marker.
    ///
    /// A marker lookup failure is treated as offline: the message stays
    /// available for pull.
    pub async fn is_online(&self, user_id: &str) -> bool {
        if self.has_local_session(user_id) {
            return true;
        }
        match self.store.scan(&keys::session_online_pattern(user_id)).await {
            Ok(markers) => !markers.is_empty(),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "online marker lookup failed");
                false
            }
        }
    }

    /// Write `payload` to every local session of `user_id`.
    ///
    /// Each write is bounded by the push timeout; a session that is closed or
    /// does not drain in time is dropped and evicted. Returns how many
    /// sessions accepted the payload.
    pub async fn push(&self, user_id: &str, payload: &str) -> usize {
        let targets: Vec<(SessionId, mpsc::Sender<String>)> = match self.sessions.get(user_id) {
            Some(sessions) => sessions
                .iter()
                .map(|s| (s.id, s.sender.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (session_id, sender) in targets {
            match sender
                .send_timeout(payload.to_string(), self.push_timeout)
                .await
            {
                Ok(()) => delivered += 1,
                Err(e) => {
                    let reason = match e {
                        SendTimeoutError::Timeout(_) => "timeout",
                        SendTimeoutError::Closed(_) => "closed",
                    };
                    tracing::warn!(
                        user_id = %user_id,
                        session_id = %session_id,
                        reason,
                        "push failed, evicting session"
                    );
                    metrics::record_session_evicted();
                    self.remove(user_id, session_id).await;
                }
            }
        }
        delivered
    }

    /// Push to every local session except those of `exclude_user`
    pub async fn broadcast(&self, payload: &str, exclude_user: Option<&str>) -> usize {
        let users: Vec<String> = self
            .sessions
            .iter()
            .map(|e| e.key().clone())
            .filter(|u| Some(u.as_str()) != exclude_user)
            .collect();

        let mut delivered = 0;
        for user_id in users {
            delivered += self.push(&user_id, payload).await;
        }
        delivered
    }

    pub fn session_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn remove_local(&self, user_id: &str, session_id: SessionId) -> bool {
        let mut now_empty = false;
        if let Some(mut sessions) = self.sessions.get_mut(user_id) {
            let before = sessions.len();
            sessions.retain(|s| s.id != session_id);
            let removed = before - sessions.len();
            if removed > 0 {
                let active = self.active.fetch_sub(removed, Ordering::SeqCst) - removed;
                metrics::set_active_sessions(active);
                tracing::debug!(
                    user_id = %user_id,
                    session_id = %session_id,
                    remaining = sessions.len(),
                    "session removed"
                );
            }
            now_empty = sessions.is_empty();
        }
        if now_empty {
            self.sessions.remove_if(user_id, |_, sessions| sessions.is_empty());
        }
        now_empty
    }

    async fn mark_online(&self, user_id: &str) {
        let key = keys::session_online(user_id, &self.instance_id);
        if let Err(e) = self.store.set_with_ttl(&key, "1", self.session_ttl).await {
            tracing::warn!(user_id = %user_id, error = %e, "failed to write online marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ephemeral::InMemoryEphemeralStore;

    fn registry(store: Arc<InMemoryEphemeralStore>) -> SessionRegistry {
        registry_on("pod-a", store)
    }

    fn registry_on(instance_id: &str, store: Arc<InMemoryEphemeralStore>) -> SessionRegistry {
        SessionRegistry::new(
            instance_id,
            store,
            Duration::from_secs(300),
            Duration::from_millis(50),
            2,
        )
    }

    #[tokio::test]
    async fn test_add_push_remove() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let registry = registry(store.clone());

        let (id, mut rx) = registry.add("u1").await;
        assert!(registry.is_online("u1").await);
        assert!(store.get("session:online:u1:pod-a").await.unwrap().is_some());

        assert_eq!(registry.push("u1", "hello").await, 1);
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));

        registry.remove("u1", id).await;
        assert!(!registry.has_local_session("u1"));
        assert!(!registry.is_online("u1").await);
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_marker_kept_while_other_sessions_remain() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let registry = registry(store.clone());

        let (first, _rx1) = registry.add("u1").await;
        let (_second, _rx2) = registry.add("u1").await;
        registry.remove("u1", first).await;

        assert!(registry.has_local_session("u1"));
        assert!(store.get("session:online:u1:pod-a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remote_marker_counts_as_online() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        store
            .set_with_ttl("session:online:u9:pod-z", "1", Duration::from_secs(60))
            .await
            .unwrap();
        let registry = registry(store);

        assert!(registry.is_online("u9").await);
        assert!(!registry.has_local_session("u9"));
        assert_eq!(registry.push("u9", "x").await, 0);
    }

    #[tokio::test]
    async fn test_leaving_one_instance_keeps_user_online_elsewhere() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let a = registry_on("pod-a", store.clone());
        let b = registry_on("pod-b", store.clone());
        let c = registry_on("pod-c", store);

        let (on_a, _rx_a) = a.add("u2").await;
        let (on_b, _rx_b) = b.add("u2").await;
        a.remove("u2", on_a).await;

        assert!(!a.has_local_session("u2"));
        assert!(a.is_online("u2").await);
        assert!(c.is_online("u2").await);

        b.remove("u2", on_b).await;
        assert!(!c.is_online("u2").await);
    }

    #[tokio::test]
    async fn test_session_count_tracks_adds_and_removals() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let registry = registry(store);

        let (first, _rx1) = registry.add("u1").await;
        let (_second, _rx2) = registry.add("u1").await;
        let (_third, _rx3) = registry.add("u2").await;
        assert_eq!(registry.session_count(), 3);

        registry.remove("u1", first).await;
        registry.remove("u1", first).await;
        assert_eq!(registry.session_count(), 2);
    }

    #[tokio::test]
    async fn test_closed_session_is_evicted() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let registry = registry(store);

        let (_id, rx) = registry.add("u1").await;
        drop(rx);

        assert_eq!(registry.push("u1", "x").await, 0);
        assert!(!registry.has_local_session("u1"));
    }

    #[tokio::test]
    async fn test_stalled_session_is_evicted_after_timeout() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let registry = registry(store);

        // Buffer of 2 and nobody draining
        let (_id, _rx) = registry.add("u1").await;
        assert_eq!(registry.push("u1", "1").await, 1);
        assert_eq!(registry.push("u1", "2").await, 1);
        assert_eq!(registry.push("u1", "3").await, 0);
        assert!(!registry.has_local_session("u1"));
    }

    #[tokio::test]
    async fn test_broadcast_skips_excluded_user() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let registry = registry(store);

        let (_a, mut rx_a) = registry.add("a").await;
        let (_b, mut rx_b) = registry.add("b").await;

        assert_eq!(registry.broadcast("presence", Some("a")).await, 1);
        assert_eq!(rx_b.recv().await.as_deref(), Some("presence"));
        assert!(rx_a.try_recv().is_err());
    }
}
