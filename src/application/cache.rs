//! TTL-bounded key/value cache.
//!
//! Entries expire lazily: a read that finds a stale entry removes it and
//! reports a miss. `purge_expired` is the explicit cleanup call.

use crate::application::lock;
use crate::application::ports::Clock;
use crate::domain::error::ConfigError;
use crate::infrastructure::clock::SystemClock;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Default entry lifetime of one hour.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) > ttl
    }
}

/// Point-in-time view of the cache contents.
///
/// Computed without evicting anything, so it can disagree with a later `get`
/// once more time has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CacheInfo {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub ttl: Duration,
}

/// Thread-safe cache with a single TTL shared by every entry.
///
/// # Example
/// ```
/// use crm_resilience::ExpiringCache;
/// use std::time::Duration;
///
/// let cache = ExpiringCache::new(Duration::from_secs(60)).unwrap();
/// cache.set("metadata", "{\"entityDefs\": {}}".to_string());
///
/// assert!(cache.get("metadata").is_some());
/// assert_eq!(cache.info().active, 1);
/// ```
pub struct ExpiringCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Create a cache backed by the system clock.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroTtl` if `ttl` is zero.
    pub fn new(ttl: Duration) -> Result<Self, ConfigError> {
        Self::with_clock(ttl, Arc::new(SystemClock::new()))
    }

    /// Create a cache that reads time from `clock`.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        if ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        })
    }

    /// Look up a fresh value. A stale entry is removed and reported as absent.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);

        let expired = entries.get(key)?.is_expired(now, self.ttl);
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or overwrite a value, restarting its lifetime.
    pub fn set(&self, key: K, value: V) {
        let inserted_at = self.clock.now();
        lock(&self.entries).insert(key, CacheEntry { value, inserted_at });
    }

    /// Remove an entry, returning its value whether or not it had expired.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        lock(&self.entries).remove(key).map(|entry| entry.value)
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Count entries by freshness without evicting anything.
    pub fn info(&self) -> CacheInfo {
        let now = self.clock.now();
        let entries = lock(&self.entries);

        let expired = entries
            .values()
            .filter(|entry| entry.is_expired(now, self.ttl))
            .count();

        CacheInfo {
            total: entries.len(),
            active: entries.len() - expired,
            expired,
            ttl: self.ttl,
        }
    }

    /// Remove every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, self.ttl));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<K, V> fmt::Debug for ExpiringCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("ttl", &self.ttl)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;

    fn cache_with_clock(ttl_secs: u64) -> (ExpiringCache<String, u32>, MockClock) {
        let clock = MockClock::new(Instant::now());
        let cache =
            ExpiringCache::with_clock(Duration::from_secs(ttl_secs), Arc::new(clock.clone()))
                .unwrap();
        (cache, clock)
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let result = ExpiringCache::<String, u32>::new(Duration::ZERO);
        assert!(matches!(result, Err(ConfigError::ZeroTtl)));
    }

    #[test]
    fn test_get_fresh_value() {
        let (cache, _clock) = cache_with_clock(10);
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_entry_at_exact_ttl_is_still_fresh() {
        let (cache, clock) = cache_with_clock(10);
        cache.set("a".to_string(), 1);

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("a"), Some(1));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_expired_get_evicts() {
        let (cache, clock) = cache_with_clock(1);
        cache.set("a".to_string(), 1);
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_set_resets_freshness() {
        let (cache, clock) = cache_with_clock(10);
        cache.set("a".to_string(), 1);
        clock.advance(Duration::from_secs(8));
        cache.set("a".to_string(), 2);
        clock.advance(Duration::from_secs(8));

        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn test_info_does_not_evict() {
        let (cache, clock) = cache_with_clock(5);
        cache.set("old".to_string(), 1);
        clock.advance(Duration::from_secs(6));
        cache.set("new".to_string(), 2);

        let info = cache.info();
        assert_eq!(info.total, 2);
        assert_eq!(info.active, 1);
        assert_eq!(info.expired, 1);
        assert_eq!(info.ttl, Duration::from_secs(5));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache_with_clock(5);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        clock.advance(Duration::from_secs(6));
        cache.set("c".to_string(), 3);

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let (cache, _clock) = cache_with_clock(5);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);

        assert_eq!(cache.remove("a"), Some(1));
        assert_eq!(cache.remove("a"), None);

        cache.clear();
        assert!(cache.is_empty());
    }
}
