//! Cached entries with time-to-live metadata.
//!
//! A [`CacheEntry`] pairs a value with the moment it was stored and the
//! window during which it stays valid:
//!
//! - **Valid** - `now - stored_at < ttl`
//! - **Expired** - anything else; the entry is logically absent
//!
//! Validity is always evaluated against an explicit `now` so callers can
//! drive it from a [`Clock`](crate::Clock) and tests can simulate time.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use std::time::Duration;
//! use wardcache_core::CacheEntry;
//!
//! let stored_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
//! let entry = CacheEntry::new("payload", stored_at, Duration::from_secs(60));
//!
//! assert!(entry.is_valid(stored_at + chrono::Duration::seconds(59)));
//! assert!(!entry.is_valid(stored_at + chrono::Duration::seconds(60)));
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Validity of an entry at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Entry is within its TTL window.
    Valid,
    /// Entry has outlived its TTL and must be purged.
    Expired,
}

/// A cached value with its storage time and TTL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Creates a new entry stored at `stored_at` and valid for `ttl`.
    pub fn new(value: V, stored_at: DateTime<Utc>, ttl: Duration) -> Self {
        CacheEntry {
            value,
            stored_at,
            ttl,
        }
    }

    /// Returns a reference to the cached value.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns when the entry was stored.
    #[inline]
    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    /// Returns the validity window.
    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Consumes the entry and returns the value.
    pub fn into_inner(self) -> V {
        self.value
    }

    /// Age of the entry at `now`.
    ///
    /// A `now` earlier than `stored_at` (wall clock stepped backwards) is
    /// treated as age zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Evaluates the entry state at `now`.
    ///
    /// An entry with a zero TTL is never valid.
    pub fn state(&self, now: DateTime<Utc>) -> EntryState {
        if self.age(now) < self.ttl {
            EntryState::Valid
        } else {
            EntryState::Expired
        }
    }

    /// Returns `true` when the entry is valid at `now`.
    #[inline]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == EntryState::Valid
    }

    /// Remaining lifetime at `now`, or `None` once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.ttl
            .checked_sub(self.age(now))
            .filter(|remaining| !remaining.is_zero())
    }
}
