//! Offload trait for background task execution.
//!
//! Prefetching warms the cache without a consumer waiting on the result.
//! The work is handed to an [`Offload`] implementation instead of being
//! spawned directly, so hosts can plug in their own task tracking and tests
//! can run offloaded work inline.

use std::future::Future;

use smol_str::SmolStr;

use crate::CacheKey;

/// Trait for spawning background tasks.
///
/// Implementors should use `Arc` internally so that all clones share the
/// same configuration and task registry.
pub trait Offload: Send + Sync + Clone {
    /// Spawns a future in the background under a task kind label
    /// (e.g. "prefetch"). The label is used for tracing and metrics.
    fn spawn<F>(&self, kind: impl Into<SmolStr>, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Spawns a future keyed by a cache key.
    ///
    /// Implementations may skip the task when another task for the same key
    /// is already in flight. Returns `true` when the task was accepted.
    fn spawn_keyed<F>(&self, key: CacheKey, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static;
}
