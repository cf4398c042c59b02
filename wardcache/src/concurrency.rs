use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;
use wardcache_core::CacheKey;

use crate::error::LoadError;

/// Result shared between coalesced loaders.
///
/// Values cross loaders as JSON so one manager can serve loaders of any
/// value type.
pub type SharedResult = Result<Value, LoadError>;

/// Why a follower did not receive the leader's result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConcurrencyError {
    /// The follower fell behind the channel.
    #[error("coalesced result channel lagged by {0} messages")]
    Lagged(u64),
    /// The leading fetch went away without publishing a result.
    #[error("coalesced fetch was abandoned")]
    Closed,
}

impl From<broadcast::error::RecvError> for ConcurrencyError {
    fn from(error: broadcast::error::RecvError) -> Self {
        match error {
            broadcast::error::RecvError::Closed => ConcurrencyError::Closed,
            broadcast::error::RecvError::Lagged(n) => ConcurrencyError::Lagged(n),
        }
    }
}

/// Result of a concurrency check: fetch upstream or wait for someone else.
pub enum ConcurrencyDecision<Res> {
    /// This caller leads and must end with `resolve` or `cleanup`.
    Proceed,
    /// Another fetch for the key is in flight; await its result.
    Await(BoxFuture<'static, Result<Res, ConcurrencyError>>),
}

/// Coordinates concurrent fetches of the same key.
pub trait ConcurrencyManager<Res>: Send + Sync {
    /// Decides whether the caller fetches or awaits an in-flight fetch.
    fn check(&self, cache_key: &CacheKey) -> ConcurrencyDecision<Res>;

    /// Publishes the leader's result to every waiting caller.
    fn resolve(&self, cache_key: &CacheKey, result: &Res);

    /// Drops the in-flight entry without a result; waiters fall back to
    /// fetching on their own.
    fn cleanup(&self, cache_key: &CacheKey);
}

/// No-op implementation that always allows requests to proceed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConcurrencyManager;

impl<Res> ConcurrencyManager<Res> for NoopConcurrencyManager
where
    Res: Send + 'static,
{
    fn check(&self, _cache_key: &CacheKey) -> ConcurrencyDecision<Res> {
        ConcurrencyDecision::Proceed
    }

    fn resolve(&self, _cache_key: &CacheKey, _result: &Res) {}

    fn cleanup(&self, _cache_key: &CacheKey) {}
}

/// Lets the first caller for a key fetch while later callers await its
/// result over a broadcast channel.
#[derive(Debug)]
pub struct BroadcastConcurrencyManager<Res> {
    in_flight: DashMap<CacheKey, broadcast::Sender<Res>>,
}

impl<Res> BroadcastConcurrencyManager<Res> {
    /// Creates a manager with no fetches in flight.
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Number of keys with a leader in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<Res> Default for BroadcastConcurrencyManager<Res> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Res> ConcurrencyManager<Res> for BroadcastConcurrencyManager<Res>
where
    Res: Clone + Send + 'static,
{
    fn check(&self, cache_key: &CacheKey) -> ConcurrencyDecision<Res> {
        match self.in_flight.entry(cache_key.clone()) {
            Entry::Occupied(entry) => {
                debug!(key = %cache_key, "Awaiting in-flight fetch");
                let mut receiver = entry.get().subscribe();
                ConcurrencyDecision::Await(Box::pin(async move {
                    receiver.recv().await.map_err(ConcurrencyError::from)
                }))
            }
            Entry::Vacant(entry) => {
                let (sender, _) = broadcast::channel(1);
                entry.insert(sender);
                ConcurrencyDecision::Proceed
            }
        }
    }

    fn resolve(&self, cache_key: &CacheKey, result: &Res) {
        if let Some((_, sender)) = self.in_flight.remove(cache_key) {
            // No receivers is fine: nobody was waiting.
            let _ = sender.send(result.clone());
        }
    }

    fn cleanup(&self, cache_key: &CacheKey) {
        self.in_flight.remove(cache_key);
    }
}
