//! Short-TTL cache used for cross-tick memoization
//!
//! Holds the price snapshot, survivor score memos and anomaly tracking
//! flags. Values are strings (usually JSON) so any key/value cache with
//! expiry can stand behind the [`Cache`] trait.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{self, Clock};

pub const PRICES_KEY: &str = "Prices";
pub const RECOMMENDER_MEMOS_KEY: &str = "RecommenderMemos";
pub const SCORES_SYNCED_KEY: &str = "SurvivorScoresSynced";
pub const MARKET_MOVE_KEY: &str = "MarketMove";
pub const PRICE_WINDOWS_KEY: &str = "PriceWindows";

pub const PRICES_TTL: Duration = Duration::from_secs(45);
pub const SCORES_SYNC_TTL: Duration = Duration::from_secs(6 * 60 * 60);
/// Used for entries that should live "until replaced"
pub const LONG_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Entries to write in one pass: key -> (value, ttl)
pub type ExpirationEntries = HashMap<String, (String, Duration)>;

pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn put(&self, key: &str, value: String, ttl: Duration);

    fn remove(&self, key: &str);

    /// Batched read. Missing or expired keys are absent from the result.
    fn get_all(&self, keys: &[String]) -> HashMap<String, String> {
        keys.iter()
            .filter_map(|k| self.get(k).map(|v| (k.clone(), v)))
            .collect()
    }

    fn put_all(&self, entries: ExpirationEntries) {
        for (key, (value, ttl)) in entries {
            self.put(&key, value, ttl);
        }
    }

    fn remove_all(&self, keys: &[String]) {
        for key in keys {
            self.remove(key);
        }
    }
}

/// Entry in the cache with an absolute expiry
#[derive(Clone, Debug)]
pub struct CachedValue {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedValue {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics for monitoring
#[derive(Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// In-process cache backed by a concurrent hashmap
pub struct MemoryCache {
    entries: DashMap<String, CachedValue>,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(clock::system())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of stored entries, expired ones included until next read
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(self.clock.now()) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            // Entry expired, remove it
            drop(entry);
            self.entries.remove(key);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn put(&self, key: &str, value: String, ttl: Duration) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let entry = CachedValue {
            value,
            expires_at: self.clock.now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_entry_expires() {
        let clock = ManualClock::new(Utc::now());
        let cache = MemoryCache::with_clock(Arc::new(clock.clone()));

        cache.put("k", "v".to_string(), Duration::from_secs(45));
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        clock.advance(Duration::from_secs(45));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_batched_calls() {
        let cache = MemoryCache::new();
        let mut entries = ExpirationEntries::new();
        entries.insert("a".to_string(), ("1".to_string(), Duration::from_secs(60)));
        entries.insert("b".to_string(), ("2".to_string(), Duration::from_secs(60)));
        cache.put_all(entries);

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = cache.get_all(&keys);
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], "2");

        cache.remove_all(&keys[..1]);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryCache::new();
        cache.get("nonexistent"); // miss
        cache.put("exists", "x".to_string(), Duration::from_secs(10));
        cache.get("exists"); // hit
        cache.get("exists"); // hit

        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 2);
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 1);
        assert!((cache.stats().hit_rate() - 0.666).abs() < 0.01);
    }
}
