//! Concurrency-bounded batch status resolution.
//!
//! Given a list of entity ids and a per-entity [`Lookup`], the resolver
//! deduplicates the ids, splits them into chunks of at most `concurrency`
//! ids and awaits each chunk as a whole before starting the next. A failed
//! lookup only affects its own entity, which falls back to
//! [`ResolvedStatus::default`].
//!
//! [`BatchResolver`] caches the whole map under a key built from the lookup
//! kind and the id set, so repeated requests for the same residents (in any
//! order) are served without touching the lookup. A map with any failed
//! lookup is never cached.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, info_span, warn};
use smol_str::SmolStr;
use wardcache_core::{CacheKey, KeyPart, Lookup, SharedClock};

use crate::cache::TtlCache;
use crate::metrics::record_batch;
use crate::policy::{BatchPolicy, ConcurrencyLimit};
use crate::status::{AssignmentCandidate, ResolvedStatus, select_status};

/// Key prefix of cached status maps.
pub const STATUS_PREFIX: &str = "assignment-status";

/// Identifier of an entity resolved by a batch.
///
/// Ids must be `Display` for the batch cache key and serde-compatible for
/// the cached map.
pub trait EntityId:
    Eq + Hash + Clone + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> EntityId for T where
    T: Eq + Hash + Clone + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Resolved status per entity.
pub type StatusMap<I> = HashMap<I, ResolvedStatus>;

/// Per-call overrides of the resolver's [`BatchPolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Chunk width for this call.
    pub concurrency: Option<ConcurrencyLimit>,
    /// TTL of the cached map for this call.
    pub ttl: Option<Duration>,
}

impl BatchOptions {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the chunk width.
    pub fn concurrency(self, concurrency: ConcurrencyLimit) -> Self {
        Self {
            concurrency: Some(concurrency),
            ..self
        }
    }

    /// Overrides the cache TTL.
    pub fn ttl(self, ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..self
        }
    }
}

/// Resolves `ids` in chunks of `concurrency` without touching any cache.
///
/// Duplicate ids are looked up once. Chunk N+1 starts only after every
/// lookup of chunk N has settled, so at most `concurrency` lookups are ever
/// in flight. Every requested id is present in the result.
pub async fn resolve_in_chunks<I, L>(
    ids: &[I],
    lookup: &L,
    concurrency: ConcurrencyLimit,
    now: DateTime<Utc>,
) -> StatusMap<I>
where
    I: EntityId,
    L: Lookup<I, Vec<AssignmentCandidate>> + ?Sized,
{
    resolve_counting_failures(ids, lookup, concurrency, now)
        .await
        .0
}

async fn resolve_counting_failures<I, L>(
    ids: &[I],
    lookup: &L,
    concurrency: ConcurrencyLimit,
    now: DateTime<Utc>,
) -> (StatusMap<I>, usize)
where
    I: EntityId,
    L: Lookup<I, Vec<AssignmentCandidate>> + ?Sized,
{
    let unique = dedup(ids);
    let width = usize::from(concurrency.get());
    let started = Instant::now();
    let mut statuses = HashMap::with_capacity(unique.len());
    let mut failures = 0;

    let span = info_span!("wardcache.batch", ids = unique.len(), concurrency = width);
    async {
        for (index, chunk) in unique.chunks(width).enumerate() {
            debug!(chunk = index, size = chunk.len(), "Resolving chunk");
            let lookups = chunk
                .iter()
                .cloned()
                .map(|id| lookup.lookup(id.clone()).map(move |result| (id, result)));

            for (id, result) in join_all(lookups).await {
                let status = match result {
                    Ok(candidates) => select_status(&candidates, now),
                    Err(error) => {
                        warn!(%id, %error, "Assignment lookup failed, using default status");
                        failures += 1;
                        ResolvedStatus::default()
                    }
                };
                statuses.insert(id, status);
            }
        }
    }
    .instrument(span)
    .await;

    record_batch(unique.len(), failures, started.elapsed());
    (statuses, failures)
}

fn dedup<I: EntityId>(ids: &[I]) -> Vec<I> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

/// Cached batch resolver for one kind of lookup.
///
/// The `kind` names the lookup the resolver is used with (`"care-plans"`,
/// `"rooms"`). Maps of different kinds never share cache entries.
#[derive(Debug, Clone)]
pub struct BatchResolver {
    cache: Arc<TtlCache>,
    policy: BatchPolicy,
    kind: SmolStr,
    clock: SharedClock,
}

impl BatchResolver {
    /// Creates a resolver over `cache`, reading time from the cache's clock.
    pub fn new(cache: Arc<TtlCache>, policy: BatchPolicy, kind: impl Into<SmolStr>) -> Self {
        let clock = cache.clock().clone();
        Self {
            cache,
            policy,
            kind: kind.into(),
            clock,
        }
    }

    /// The resolver's policy.
    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    /// The lookup kind this resolver caches under.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Cache key of the status map for `ids`.
    ///
    /// The key depends on the resolver's kind and the id set, not on order
    /// or repetition. Every status map lives under [`STATUS_PREFIX`].
    pub fn cache_key<I: EntityId>(&self, ids: &[I]) -> CacheKey {
        CacheKey::for_ids(STATUS_PREFIX, ids).with_part(KeyPart::new("kind", Some(&self.kind)))
    }

    /// Resolves `ids` with the resolver's policy.
    pub async fn resolve_all<I, L>(&self, ids: &[I], lookup: &L) -> StatusMap<I>
    where
        I: EntityId,
        L: Lookup<I, Vec<AssignmentCandidate>> + ?Sized,
    {
        self.resolve_all_with(ids, lookup, BatchOptions::default())
            .await
    }

    /// Resolves `ids`, serving a cached map for the same id set when one is
    /// still valid.
    pub async fn resolve_all_with<I, L>(
        &self,
        ids: &[I],
        lookup: &L,
        options: BatchOptions,
    ) -> StatusMap<I>
    where
        I: EntityId,
        L: Lookup<I, Vec<AssignmentCandidate>> + ?Sized,
    {
        if ids.is_empty() {
            return StatusMap::new();
        }
        let key = self.cache_key(ids);
        if let Some(cached) = self.cache.get_as::<Vec<(I, ResolvedStatus)>>(&key) {
            debug!(%key, "Serving cached status map");
            return cached.into_iter().collect();
        }
        self.resolve_and_store(key, ids, lookup, options).await
    }

    /// Resolves `ids` without reading the cache. The fresh map is still
    /// written back.
    pub async fn resolve_all_fresh<I, L>(&self, ids: &[I], lookup: &L) -> StatusMap<I>
    where
        I: EntityId,
        L: Lookup<I, Vec<AssignmentCandidate>> + ?Sized,
    {
        if ids.is_empty() {
            return StatusMap::new();
        }
        let key = self.cache_key(ids);
        self.resolve_and_store(key, ids, lookup, BatchOptions::default())
            .await
    }

    async fn resolve_and_store<I, L>(
        &self,
        key: CacheKey,
        ids: &[I],
        lookup: &L,
        options: BatchOptions,
    ) -> StatusMap<I>
    where
        I: EntityId,
        L: Lookup<I, Vec<AssignmentCandidate>> + ?Sized,
    {
        let concurrency = options.concurrency.unwrap_or(self.policy.concurrency);
        let ttl = options
            .ttl
            .or(self.policy.ttl)
            .unwrap_or(self.cache.policy().status_ttl);

        let (statuses, failures) =
            resolve_counting_failures(ids, lookup, concurrency, self.clock.now()).await;
        if failures > 0 {
            debug!(%key, failures, "Not caching status map with failed lookups");
            return statuses;
        }

        let entries: Vec<(&I, &ResolvedStatus)> = statuses.iter().collect();
        if let Err(error) = self.cache.set_as(key.clone(), &entries, ttl) {
            warn!(%key, %error, "Skipping status map caching");
        }
        statuses
    }
}
