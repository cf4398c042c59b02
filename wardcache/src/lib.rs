#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod batch;
pub mod cache;

/// Sharing one in-flight fetch between loaders.
///
/// When several loaders miss on the same key at once,
/// [`BroadcastConcurrencyManager`](concurrency::BroadcastConcurrencyManager)
/// lets the first one fetch and hands its result to the rest.
pub mod concurrency;

pub mod config;

/// Error types.
///
/// - [`LoadError`] - a fetch failed or timed out
/// - [`CacheError`] - a value could not be encoded into or decoded from the cache
/// - [`ConfigError`] - settings could not be parsed
pub mod error;

pub mod fetch;
pub mod loader;

pub mod metrics;

pub mod offload;

/// Policy types and their defaults.
///
/// - [`CachePolicy`](policy::CachePolicy) - default TTLs and size bound
/// - [`LoaderPolicy`](policy::LoaderPolicy) - write-through TTL, timeout, coalescing
/// - [`BatchPolicy`](policy::BatchPolicy) - chunk width and map TTL
/// - [`PrefetchPolicy`](policy::PrefetchPolicy) - prefetch delay
pub mod policy;

pub mod prefetch;

mod service;

pub mod status;

pub use batch::{BatchOptions, BatchResolver, EntityId, StatusMap};
pub use cache::{CacheStats, TtlCache};
pub use config::{Settings, SettingsBuilder};
pub use error::{CacheError, ConfigError, LoadError};
pub use loader::{KeyedLoader, LoadOutcome, LoadState, Loadable};
pub use prefetch::Prefetcher;
pub use service::CacheService;
pub use status::{AssignmentCandidate, ResolvedStatus, select_status};

pub use wardcache_core::{
    BoxError, CacheEntry, CacheKey, CancellationToken, Clock, EntryState, KeyPart, Lookup,
    Offload, Producer, SharedClock, SystemClock, system_clock,
};

/// The `wardcache` prelude.
///
/// ```rust
/// use wardcache::prelude::*;
/// ```
///
/// This imports the service, the loader and its outcomes, the batch
/// resolver and the source traits.
pub mod prelude {
    pub use crate::{
        BatchResolver, BoxError, CacheKey, CacheService, CancellationToken, KeyedLoader,
        LoadOutcome, LoadState, Lookup, Producer, ResolvedStatus, Settings, TtlCache,
    };
}
