//! Background cache warming.
//!
//! A prefetch waits for the configured delay, skips itself when the key was
//! cached in the meantime and otherwise runs the producer and stores the
//! result. Nobody awaits a prefetch: failures are logged and dropped, and
//! the cache is left untouched.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{Instrument, debug, info_span, warn};
use wardcache_core::{CacheKey, CancellationToken, Offload, Producer};

use crate::cache::TtlCache;
use crate::offload::OffloadManager;
use crate::policy::PrefetchPolicy;

/// Schedules prefetches on an [`Offload`] implementation.
#[derive(Debug, Clone)]
pub struct Prefetcher<O = OffloadManager> {
    cache: Arc<TtlCache>,
    offload: O,
    policy: PrefetchPolicy,
    ttl: Duration,
}

impl<O: Offload> Prefetcher<O> {
    /// Creates a prefetcher writing into `cache` with the cache's default
    /// TTL.
    pub fn new(cache: Arc<TtlCache>, offload: O, policy: PrefetchPolicy) -> Self {
        let ttl = cache.policy().default_ttl;
        Self {
            cache,
            offload,
            policy,
            ttl,
        }
    }

    /// Overrides the TTL of prefetched entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The prefetch policy.
    pub fn policy(&self) -> &PrefetchPolicy {
        &self.policy
    }

    /// Schedules a prefetch of `key`.
    ///
    /// Returns `false` when the offload refused the task, typically because
    /// a prefetch of the same key is already pending.
    pub fn prefetch<T, P>(&self, key: CacheKey, producer: P) -> bool
    where
        T: Serialize + Send + 'static,
        P: Producer<T> + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let delay = self.policy.delay;
        let ttl = self.ttl;
        let span = info_span!("wardcache.prefetch", key = %key);
        let task_key = key.clone();

        let task = async move {
            tokio::time::sleep(delay).await;
            if cache.contains(&key) {
                debug!("Key already cached, skipping prefetch");
                return;
            }
            match producer.produce(CancellationToken::new()).await {
                Ok(value) => {
                    if let Err(error) = cache.set_as(key, &value, ttl) {
                        warn!(%error, "Prefetched value was not cached");
                    }
                }
                Err(error) => warn!(%error, "Prefetch failed"),
            }
        };

        let accepted = self.offload.spawn_keyed(task_key, task.instrument(span));
        if !accepted {
            debug!("Prefetch already pending");
        }
        accepted
    }
}
