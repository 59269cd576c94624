//! Short-lived key/value state: presence, typing, and live-session markers.
//!
//! Every write carries a TTL. Expired keys are invisible to reads and scans,
//! which is what makes stale presence and abandoned typing indicators
//! disappear without an explicit "offline" or "stopped" signal.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AppResult;

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryEphemeralStore;
pub use redis_store::RedisEphemeralStore;

#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Values for `keys`, positionally aligned with the input
    async fn get_many(&self, keys: &[String]) -> AppResult<Vec<Option<String>>>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Live keys matching a glob pattern where `*` is the only wildcard
    async fn scan(&self, pattern: &str) -> AppResult<Vec<String>>;
}

/// Key layout shared by every store implementation
pub mod keys {
    pub const PRESENCE_PREFIX: &str = "presence:";
    pub const TYPING_PREFIX: &str = "typing:";

    pub fn presence(user_id: &str) -> String {
        format!("{PRESENCE_PREFIX}{user_id}")
    }

    pub fn presence_pattern() -> String {
        format!("{PRESENCE_PREFIX}*")
    }

    /// `typing:{conversation_key}:{typer}`
    pub fn typing(conversation_key: &str, user_id: &str) -> String {
        format!("{TYPING_PREFIX}{conversation_key}:{user_id}")
    }

    /// Patterns covering every conversation `user_id` takes part in.
    ///
    /// The user sorts either first or second inside the conversation key.
    pub fn typing_patterns_for(user_id: &str) -> [String; 2] {
        [
            format!("{TYPING_PREFIX}{user_id}_*:*"),
            format!("{TYPING_PREFIX}*_{user_id}:*"),
        ]
    }

    /// Typer id encoded at the end of a typing key
    pub fn typer_of(key: &str) -> Option<&str> {
        key.rsplit_once(':').map(|(_, typer)| typer)
    }

    pub fn device_session(user_id: &str, device_id: &str) -> String {
        format!("user_sessions:{user_id}:{device_id}")
    }

    /// `session:online:{user}:{instance}`; each instance owns its own marker
    pub fn session_online(user_id: &str, instance_id: &str) -> String {
        format!("session:online:{user_id}:{instance_id}")
    }

    /// Markers of `user_id` on every instance
    pub fn session_online_pattern(user_id: &str) -> String {
        format!("session:online:{user_id}:*")
    }
}

/// Glob match supporting only `*`, the subset of Redis `MATCH` the keys above use
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !key.starts_with(first) || key.len() < first.len() + last.len() || !key.ends_with(last) {
        return false;
    }

    let mut rest = &key[first.len()..key.len() - last.len()];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(idx) => rest = &rest[idx + middle.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("presence:*", "presence:u1"));
        assert!(!glob_match("presence:*", "typing:u1_u2:u1"));
        assert!(glob_match("typing:u1_*:*", "typing:u1_u2:u2"));
        assert!(glob_match("typing:*_u2:*", "typing:u1_u2:u1"));
        assert!(!glob_match("typing:*_u2:*", "typing:u2_u3:u3"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[test]
    fn test_typing_keys() {
        let key = keys::typing("u1_u2", "u1");
        assert_eq!(key, "typing:u1_u2:u1");
        assert_eq!(keys::typer_of(&key), Some("u1"));

        let [lead, trail] = keys::typing_patterns_for("u2");
        assert!(!glob_match(&lead, &key));
        assert!(glob_match(&trail, &key));
    }

    #[test]
    fn test_session_markers_are_per_instance() {
        let pattern = keys::session_online_pattern("u1");
        assert!(glob_match(&pattern, &keys::session_online("u1", "pod-a")));
        assert!(glob_match(&pattern, &keys::session_online("u1", "pod-b")));
        assert!(!glob_match(&pattern, &keys::session_online("u10", "pod-a")));
        assert_ne!(
            keys::session_online("u1", "pod-a"),
            keys::session_online("u1", "pod-b")
        );
    }
}
