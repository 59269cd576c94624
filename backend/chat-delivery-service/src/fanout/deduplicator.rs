/// Duplicate suppression for at-least-once consumption
///
/// Remembers recently handled event ids for a TTL. A redelivered event inside
/// the window is skipped; after the window it is handled again, which the
/// fan-out tolerates (a repeated push is acceptable).
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::metrics;

#[derive(Debug, Clone)]
struct DeduplicationEntry {
    created_at: Instant,
}

impl DeduplicationEntry {
    fn new() -> Self {
        Self {
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

pub struct EventDeduplicator<K>
where
    K: Hash + Eq + Clone,
{
    seen: Arc<DashMap<K, DeduplicationEntry>>,
    ttl: Duration,
}

impl<K> EventDeduplicator<K>
where
    K: Hash + Eq + Clone + std::fmt::Display,
{
    pub fn new(ttl: Duration) -> Self {
        info!(ttl_secs = ttl.as_secs(), "Initializing event deduplicator");
        Self {
            seen: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// `true` the first time a key is seen inside the TTL window
    pub fn process_or_skip(&self, key: K) -> bool {
        // entry() holds the shard lock, so two racing deliveries of the same
        // id cannot both pass
        let fresh = match self.seen.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(self.ttl) {
                    occupied.insert(DeduplicationEntry::new());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(DeduplicationEntry::new());
                true
            }
        };

        if !fresh {
            debug!(key = %key, "Duplicate event detected - skipping");
            metrics::record_duplicate_skipped();
        }
        fresh
    }

    /// Drop expired entries; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before - self.seen.len();
        if removed > 0 {
            debug!(
                removed = removed,
                remaining = self.seen.len(),
                "Cleaned up expired deduplication entries"
            );
        }
        removed
    }

    pub fn size(&self) -> usize {
        self.seen.len()
    }
}

impl<K> Clone for EventDeduplicator<K>
where
    K: Hash + Eq + Clone,
{
    fn clone(&self) -> Self {
        Self {
            seen: Arc::clone(&self.seen),
            ttl: self.ttl,
        }
    }
}
