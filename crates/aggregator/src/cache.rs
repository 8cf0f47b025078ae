//! Write-through TTL cache for provider responses.
//!
//! Keyed by `(ticker, operation, source)`. Fresh entries short-circuit the
//! network; entries past their TTL but within `stale_factor x TTL` are served
//! only after a full chain failure, flagged as stale.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

/// Concurrent TTL cache. Lookups and inserts hold a per-shard lock for the
/// duration of the operation only.
#[derive(Debug)]
pub struct TtlCache<K: Eq + Hash, V: Clone> {
    entries: DashMap<K, CacheEntry<V>>,
    stale_factor: u32,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    #[must_use]
    pub fn new(stale_factor: u32) -> Self {
        Self {
            entries: DashMap::new(),
            stale_factor: stale_factor.max(1),
        }
    }

    /// Stores the latest successful response.
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Returns the value if its TTL has not elapsed.
    #[must_use]
    pub fn fresh(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        (entry.stored_at.elapsed() <= entry.ttl).then(|| entry.value.clone())
    }

    /// Returns an expired value still inside the stale window, together with
    /// its age. Used only after every provider in the chain has failed.
    #[must_use]
    pub fn stale(&self, key: &K) -> Option<(V, Duration)> {
        let entry = self.entries.get(key)?;
        let age = entry.stored_at.elapsed();
        let stale_limit = entry.ttl.saturating_mul(self.stale_factor);
        (age > entry.ttl && age <= stale_limit).then(|| (entry.value.clone(), age))
    }

    /// Fresh-or-stale lookup, stale flagged.
    #[must_use]
    pub fn any(&self, key: &K) -> Option<(V, bool)> {
        if let Some(value) = self.fresh(key) {
            return Some((value, false));
        }
        self.stale(key).map(|(value, _)| (value, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_returned() {
        let cache: TtlCache<&str, u32> = TtlCache::new(10);
        cache.insert("NVDA/quote/polygon", 7, Duration::from_secs(60));
        assert_eq!(cache.fresh(&"NVDA/quote/polygon"), Some(7));
        assert!(cache.stale(&"NVDA/quote/polygon").is_none());
    }

    #[test]
    fn expired_entry_is_stale_within_window() {
        let cache: TtlCache<&str, u32> = TtlCache::new(10);
        cache.insert("key", 7, Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.fresh(&"key").is_none());
        let (value, age) = cache.stale(&"key").unwrap();
        assert_eq!(value, 7);
        assert!(age >= Duration::from_millis(5));
    }

    #[test]
    fn entry_past_stale_window_is_gone() {
        let cache: TtlCache<&str, u32> = TtlCache::new(2);
        cache.insert("key", 7, Duration::from_millis(2));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.fresh(&"key").is_none());
        assert!(cache.stale(&"key").is_none());
        assert!(cache.any(&"key").is_none());
    }

    #[test]
    fn any_flags_staleness() {
        let cache: TtlCache<&str, u32> = TtlCache::new(10);
        cache.insert("key", 1, Duration::from_secs(60));
        assert_eq!(cache.any(&"key"), Some((1, false)));

        cache.insert("old", 2, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.any(&"old"), Some((2, true)));
    }

    #[test]
    fn missing_key_is_none() {
        let cache: TtlCache<&str, u32> = TtlCache::new(10);
        assert!(cache.any(&"absent").is_none());
    }
}
