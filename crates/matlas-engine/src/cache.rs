//! bounded, ttl'd, process-local cache of project snapshots.

use crate::state::ProjectState;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MAX_ENTRIES: usize = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
}

struct Entry {
    state: ProjectState,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// lru cache keyed by project id plus discovery options digest.
pub struct DiscoveryCache {
    inner: Mutex<Inner>,
    max_entries: usize,
    ttl: Duration,
}

impl Default for DiscoveryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl DiscoveryCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// return a fresh snapshot, counting hits, misses and expirations.
    pub fn get(&self, key: &str) -> Option<ProjectState> {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let expired = match inner.entries.get(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
        };
        if expired {
            inner.entries.remove(key);
            inner.expirations += 1;
            inner.misses += 1;
            return None;
        }
        inner.hits += 1;
        let entry = inner.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(entry.state.clone())
    }

    /// store a snapshot, evicting the least recently used entry when full.
    pub fn insert(&self, key: impl Into<String>, state: ProjectState) {
        let key = key.into();
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                inner.evictions += 1;
            }
        }
        inner.entries.insert(
            key,
            Entry {
                state,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// drop every snapshot of one project, whatever options produced it.
    pub fn invalidate_project(&self, project_id: &str) -> usize {
        let prefix = format!("{project_id}:");
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(&prefix));
        before - inner.entries.len()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: &str) -> ProjectState {
        ProjectState::new(id)
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_ttl() {
        let cache = DiscoveryCache::new(10, Duration::from_secs(60));
        cache.insert("p1", state("p1"));
        assert!(cache.get("p1").is_some());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("p1").is_none());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = DiscoveryCache::new(2, DEFAULT_TTL);
        cache.insert("a", state("a"));
        cache.insert("b", state("b"));
        assert!(cache.get("a").is_some());
        cache.insert("c", state("c"));
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 2);
        assert!((stats.hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn reinsert_does_not_evict() {
        let cache = DiscoveryCache::new(1, DEFAULT_TTL);
        cache.insert("a", state("a"));
        cache.insert("a", state("a"));
        assert_eq!(cache.stats().evictions, 0);
        assert!(cache.invalidate("a"));
        assert_eq!(cache.stats().size, 0);
    }

    #[tokio::test]
    async fn invalidate_project_drops_every_variant() {
        let cache = DiscoveryCache::new(10, DEFAULT_TTL);
        cache.insert("p1:aaaa", state("p1"));
        cache.insert("p1:bbbb", state("p1"));
        cache.insert("p10:aaaa", state("p10"));
        assert_eq!(cache.invalidate_project("p1"), 2);
        assert!(cache.get("p10:aaaa").is_some());
        assert_eq!(cache.stats().size, 1);
    }
}
