use std::time::Duration;

use bounded_integer::bounded_integer;
use serde::{Deserialize, Serialize};

/// Default validity window for cache entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default validity window for cached assignment-status maps.
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(2 * 60);

/// Default delay before a prefetch runs.
pub const DEFAULT_PREFETCH_DELAY: Duration = Duration::from_secs(1);

/// Default number of lookups a batch keeps in flight.
pub const DEFAULT_CONCURRENCY: u8 = 8;

bounded_integer! {
    /// Number of lookups a batch keeps in flight (1-255).
    /// A value of 1 resolves entities strictly one after another.
    #[repr(u8)]
    pub struct ConcurrencyLimit { 1..=255 }
}

fn default_concurrency() -> ConcurrencyLimit {
    ConcurrencyLimit::new_saturating(DEFAULT_CONCURRENCY)
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

fn default_status_ttl() -> Duration {
    DEFAULT_STATUS_TTL
}

fn default_prefetch_delay() -> Duration {
    DEFAULT_PREFETCH_DELAY
}

/// Settings of the TTL cache itself.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CachePolicy {
    /// TTL used by `set_default` and by loaders without their own TTL
    /// (e.g. "5m", "30s").
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub default_ttl: Duration,
    /// TTL for cached assignment-status maps.
    #[serde(default = "default_status_ttl", with = "humantime_serde")]
    pub status_ttl: Duration,
    /// Upper bound on stored entries. When exceeded, the oldest entry is
    /// evicted. Unbounded when absent.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            status_ttl: DEFAULT_STATUS_TTL,
            max_entries: None,
        }
    }
}

impl CachePolicy {
    /// Creates a builder starting from the defaults.
    pub fn builder() -> CachePolicyBuilder {
        CachePolicyBuilder::default()
    }
}

/// Builder for [`CachePolicy`].
#[derive(Debug, Clone, Default)]
pub struct CachePolicyBuilder {
    policy: CachePolicy,
}

impl CachePolicyBuilder {
    /// Sets the default TTL.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.policy.default_ttl = ttl;
        self
    }

    /// Sets the assignment-status TTL.
    pub fn status_ttl(mut self, ttl: Duration) -> Self {
        self.policy.status_ttl = ttl;
        self
    }

    /// Bounds the number of stored entries.
    pub fn max_entries(mut self, max: usize) -> Self {
        self.policy.max_entries = Some(max);
        self
    }

    /// Builds the policy.
    pub fn build(self) -> CachePolicy {
        self.policy
    }
}

/// Per-loader behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct LoaderPolicy {
    /// TTL for values written through by the loader. Falls back to the
    /// cache's default TTL when absent.
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// Upper bound on a single producer call. A timed out fetch is an
    /// ordinary failure.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Share one in-flight fetch between loaders asking for the same key.
    #[serde(default)]
    pub coalesce: bool,
}

impl LoaderPolicy {
    /// Creates a builder starting from the defaults.
    pub fn builder() -> LoaderPolicyBuilder {
        LoaderPolicyBuilder::default()
    }
}

/// Builder for [`LoaderPolicy`].
#[derive(Debug, Clone, Default)]
pub struct LoaderPolicyBuilder {
    policy: LoaderPolicy,
}

impl LoaderPolicyBuilder {
    /// Sets the write-through TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.policy.ttl = Some(ttl);
        self
    }

    /// Sets the producer timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = Some(timeout);
        self
    }

    /// Enables or disables coalescing.
    pub fn coalesce(mut self, enabled: bool) -> Self {
        self.policy.coalesce = enabled;
        self
    }

    /// Builds the policy.
    pub fn build(self) -> LoaderPolicy {
        self.policy
    }
}

/// Batch resolution behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct BatchPolicy {
    /// Chunk width, i.e. the maximum number of lookups in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: ConcurrencyLimit,
    /// TTL of the cached status map (e.g. "2m"). Falls back to the cache's
    /// `status_ttl` when absent.
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            ttl: None,
        }
    }
}

/// Background prefetch behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PrefetchPolicy {
    /// How long a prefetch waits before checking the cache and fetching.
    #[serde(default = "default_prefetch_delay", with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for PrefetchPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_PREFETCH_DELAY,
        }
    }
}
