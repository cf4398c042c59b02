//! Process-wide TTL cache.
//!
//! [`TtlCache`] maps [`CacheKey`]s to [`CacheEntry`]s. Expiry is lazy: an
//! entry that has outlived its TTL is removed by the read that notices it,
//! and [`stats`](TtlCache::stats) / [`purge_expired`](TtlCache::purge_expired)
//! sweep the whole map.
//!
//! Every operation is synchronous and never holds a shard guard across an
//! `.await`, so the cache can be shared freely between tasks on a
//! multi-threaded runtime.
//!
//! ```
//! use std::time::Duration;
//! use wardcache::{CacheKey, TtlCache};
//!
//! let cache: TtlCache<u32> = TtlCache::new();
//! let key = CacheKey::entity("residents", "r-1");
//!
//! cache.set(key.clone(), 7, Duration::from_secs(60));
//! assert_eq!(cache.get(&key), Some(7));
//! assert!(cache.delete(&key));
//! assert_eq!(cache.get(&key), None);
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use wardcache_core::{CacheEntry, CacheKey, SharedClock, system_clock};

use crate::error::CacheError;
use crate::metrics::{CacheLookup, record_cache_lookup};
use crate::policy::CachePolicy;

lazy_static! {
    static ref GLOBAL: Arc<TtlCache> = Arc::new(TtlCache::new());
}

/// Counts observed by [`TtlCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries present before the sweep.
    pub total: usize,
    /// Entries still within their TTL.
    pub valid: usize,
    /// Entries that had expired and were purged by the sweep.
    pub expired: usize,
}

/// In-memory cache with per-entry time-to-live.
///
/// The default value type is [`serde_json::Value`], which is what the shared
/// process-wide instance stores; typed access goes through
/// [`get_as`](TtlCache::get_as) and [`set_as`](TtlCache::set_as).
#[derive(Debug)]
pub struct TtlCache<V = Value> {
    entries: DashMap<CacheKey, CacheEntry<V>>,
    clock: SharedClock,
    policy: CachePolicy,
}

impl<V> TtlCache<V> {
    /// Creates an empty cache driven by the system clock.
    pub fn new() -> Self {
        Self::with_policy(CachePolicy::default(), system_clock())
    }

    /// Creates an empty cache driven by `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self::with_policy(CachePolicy::default(), clock)
    }

    /// Creates an empty cache with an explicit policy and clock.
    pub fn with_policy(policy: CachePolicy, clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            policy,
        }
    }

    /// Returns the clock entries are stamped with.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Returns the cache policy.
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// The entry's storage time is reset to now. A zero `ttl` stores an entry
    /// that is never valid.
    pub fn set(&self, key: CacheKey, value: V, ttl: Duration) {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        self.entries.insert(key.clone(), entry);
        if let Some(max) = self.policy.max_entries {
            self.enforce_bound(max, &key);
        }
    }

    /// Stores `value` under `key` with the policy's default TTL.
    pub fn set_default(&self, key: CacheKey, value: V) {
        self.set(key, value, self.policy.default_ttl);
    }

    /// Returns `true` if `key` holds a valid entry.
    ///
    /// An expired entry is purged as a side effect.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lookup(key, |_| ()).is_some()
    }

    /// Removes the entry for `key`. Returns `true` if something was removed.
    pub fn delete(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Removes every entry whose key lives under `prefix`.
    ///
    /// Returns the number of removed entries.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = key.prefix() != prefix;
            if !keep {
                removed += 1;
            }
            keep
        });
        debug!(prefix, removed, "Invalidated cache prefix");
        removed
    }

    /// Walks every entry, purges the expired ones and reports what it saw.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let mut stats = CacheStats::default();
        self.entries.retain(|_, entry| {
            stats.total += 1;
            if entry.is_valid(now) {
                stats.valid += 1;
                true
            } else {
                stats.expired += 1;
                false
            }
        });
        stats
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.stats().expired
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup<R>(&self, key: &CacheKey, read: impl FnOnce(&CacheEntry<V>) -> R) -> Option<R> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if entry.is_valid(now) => {
                record_cache_lookup(CacheLookup::Hit);
                return Some(read(&*entry));
            }
            Some(_) => {}
            None => {
                record_cache_lookup(CacheLookup::Miss);
                return None;
            }
        }
        // The shard guard is released above; a fresh `set` racing with this
        // removal keeps its entry because the predicate re-checks validity.
        self.entries.remove_if(key, |_, entry| !entry.is_valid(now));
        debug!(%key, "Purged expired cache entry");
        record_cache_lookup(CacheLookup::Expired);
        None
    }

    /// Evicts the oldest entries until at most `max` remain. The entry just
    /// written under `inserted` is never a candidate.
    fn enforce_bound(&self, max: usize, inserted: &CacheKey) {
        if self.entries.len() <= max {
            return;
        }
        self.purge_expired();
        while self.entries.len() > max {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| entry.key() != inserted)
                .min_by_key(|entry| entry.value().stored_at())
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    debug!(%key, max, "Evicted oldest cache entry");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl<V: Clone> TtlCache<V> {
    /// Returns the value for `key` if it exists and is still valid.
    ///
    /// An expired entry is removed as part of the read and `None` is
    /// returned.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.lookup(key, |entry| entry.value().clone())
    }
}

impl TtlCache<Value> {
    /// Returns the shared process-wide cache.
    ///
    /// The instance is created on first use. Components accept an
    /// `Arc<TtlCache>` so tests can pass isolated caches instead.
    pub fn global() -> Arc<TtlCache> {
        Arc::clone(&GLOBAL)
    }

    /// Returns the value for `key` decoded into `T`.
    ///
    /// An entry that does not decode is logged, removed and reported as a
    /// miss. A value written under `key` in the meantime is kept.
    pub fn get_as<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let (value, stored_at) =
            self.lookup(key, |entry| (entry.value().clone(), entry.stored_at()))?;
        match T::deserialize(&value) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                warn!(%key, %error, "Dropping undecodable cache entry");
                self.discard(key, stored_at, &value);
                None
            }
        }
    }

    fn discard(&self, key: &CacheKey, stored_at: DateTime<Utc>, value: &Value) -> bool {
        self.entries
            .remove_if(key, |_, entry| {
                entry.stored_at() == stored_at && entry.value() == value
            })
            .is_some()
    }

    /// Like [`get_as`](Self::get_as), but a decode failure is returned and
    /// the entry is left in place.
    pub fn try_get_as<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        self.get(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(CacheError::Decode)
    }

    /// Encodes `value` and stores it under `key` for `ttl`.
    ///
    /// Nothing is stored when encoding fails.
    pub fn set_as<T: Serialize>(
        &self,
        key: CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let encoded = serde_json::to_value(value).map_err(CacheError::Encode)?;
        self.set(key, encoded, ttl);
        Ok(())
    }
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;
    use wardcache_core::{Clock, MockClock};

    fn cache_with_clock() -> (TtlCache<u32>, MockClock) {
        let clock = MockClock::new();
        (TtlCache::with_clock(Arc::new(clock.clone())), clock)
    }

    fn key(id: &str) -> CacheKey {
        CacheKey::entity("residents", id)
    }

    #[test]
    fn test_get_after_set_and_after_expiry() {
        let (cache, clock) = cache_with_clock();
        cache.set(key("a"), 1, Duration::from_millis(100));
        assert_eq!(cache.get(&key("a")), Some(1));

        clock.advance(Duration::from_millis(100));
        assert_eq!(cache.get(&key("a")), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().total, 0);
    }

    #[test]
    fn test_set_overwrites_and_resets_stored_at() {
        let (cache, clock) = cache_with_clock();
        cache.set(key("a"), 1, Duration::from_secs(10));
        clock.advance(Duration::from_secs(8));
        cache.set(key("a"), 2, Duration::from_secs(10));
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&key("a")), Some(2));
    }

    #[test]
    fn test_zero_ttl_is_never_served() {
        let (cache, _clock) = cache_with_clock();
        cache.set(key("a"), 1, Duration::ZERO);
        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_stats_purges_expired() {
        let (cache, clock) = cache_with_clock();
        cache.set(key("short"), 1, Duration::from_secs(1));
        cache.set(key("long"), 2, Duration::from_secs(60));
        clock.advance(Duration::from_secs(2));

        let stats = cache.stats();
        assert_eq!(
            stats,
            CacheStats {
                total: 2,
                valid: 1,
                expired: 1
            }
        );
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_delete_clear_and_prefix_invalidation() {
        let (cache, _clock) = cache_with_clock();
        let ttl = Duration::from_secs(60);
        cache.set(key("a"), 1, ttl);
        cache.set(key("b"), 2, ttl);
        cache.set(CacheKey::entity("staff", "s-1"), 3, ttl);

        assert!(cache.delete(&key("a")));
        assert!(!cache.delete(&key("a")));
        assert_eq!(cache.invalidate_prefix("residents"), 1);
        assert_eq!(cache.get(&CacheKey::entity("staff", "s-1")), Some(3));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_default_uses_policy_ttl() {
        let clock = MockClock::new();
        let policy = CachePolicy::builder()
            .default_ttl(Duration::from_secs(5))
            .build();
        let cache: TtlCache<u32> = TtlCache::with_policy(policy, Arc::new(clock.clone()));

        cache.set_default(key("a"), 1);
        clock.advance(Duration::from_secs(4));
        assert!(cache.contains(&key("a")));
        clock.advance(Duration::from_secs(1));
        assert!(!cache.contains(&key("a")));
    }

    #[test]
    fn test_max_entries_evicts_oldest() {
        let clock = MockClock::new();
        let policy = CachePolicy::builder().max_entries(2).build();
        let cache: TtlCache<u32> = TtlCache::with_policy(policy, Arc::new(clock.clone()));
        let ttl = Duration::from_secs(60);

        cache.set(key("a"), 1, ttl);
        clock.advance(Duration::from_secs(1));
        cache.set(key("b"), 2, ttl);
        clock.advance(Duration::from_secs(1));
        cache.set(key("c"), 3, ttl);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.get(&key("c")), Some(3));
    }

    #[test]
    fn test_max_entries_keeps_new_entry_with_frozen_clock() {
        let policy = CachePolicy::builder().max_entries(2).build();
        let cache: TtlCache<u32> = TtlCache::with_policy(policy, Arc::new(MockClock::new()));
        let ttl = Duration::from_secs(60);

        for i in 0..50 {
            let id = format!("r-{i}");
            cache.set(key(&id), i, ttl);
            assert_eq!(cache.get(&key(&id)), Some(i));
            assert!(cache.len() <= 2);
        }
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Resident {
        id: String,
        room: u32,
    }

    #[test]
    fn test_typed_access() {
        let cache: TtlCache = TtlCache::with_clock(Arc::new(MockClock::new()));
        let resident = Resident {
            id: "r-1".into(),
            room: 12,
        };
        cache
            .set_as(key("r-1"), &resident, Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.get_as::<Resident>(&key("r-1")), Some(resident));
    }

    #[test]
    fn test_undecodable_entry_is_a_miss_and_removed() {
        let cache: TtlCache = TtlCache::with_clock(Arc::new(MockClock::new()));
        cache.set(key("r-1"), Value::String("nope".into()), Duration::from_secs(60));
        assert!(matches!(
            cache.try_get_as::<Resident>(&key("r-1")),
            Err(CacheError::Decode(_))
        ));
        assert!(!cache.is_empty());
        assert_eq!(cache.get_as::<Resident>(&key("r-1")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_discard_keeps_value_written_after_the_read() {
        let clock = MockClock::new();
        let cache: TtlCache = TtlCache::with_clock(Arc::new(clock.clone()));
        let bad = Value::String("nope".into());
        cache.set(key("r-1"), bad.clone(), Duration::from_secs(60));
        let stored_at = clock.now();

        clock.advance(Duration::from_secs(1));
        let fresh = serde_json::json!({ "id": "r-1", "room": 4 });
        cache.set(key("r-1"), fresh, Duration::from_secs(60));

        assert!(!cache.discard(&key("r-1"), stored_at, &bad));
        assert_eq!(
            cache.get_as::<Resident>(&key("r-1")),
            Some(Resident {
                id: "r-1".into(),
                room: 4
            })
        );
    }

    #[test]
    fn test_global_is_shared() {
        let a = TtlCache::global();
        let b = TtlCache::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
