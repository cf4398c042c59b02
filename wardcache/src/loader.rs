//! Cache-first loader bound to one consumer.
//!
//! A [`KeyedLoader`] is what a screen or component holds while it needs data
//! for a key. [`load`](KeyedLoader::load) serves a valid cache entry without
//! I/O; otherwise it runs the producer in a fresh fetch session, writes the
//! result through to the cache and publishes it on a `watch` channel.
//!
//! Only the consumer's latest session may change anything. Starting a new
//! load, calling [`cancel`](KeyedLoader::cancel) or dropping the loader
//! cancels the in-flight session, and whatever it produces afterwards never
//! reaches the cache or the visible state.
//!
//! ```
//! use std::sync::Arc;
//! use wardcache::{BoxError, CacheKey, CancellationToken, KeyedLoader, LoadOutcome, TtlCache};
//! use wardcache::policy::LoaderPolicy;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = Arc::new(TtlCache::new());
//! let loader: KeyedLoader<Vec<String>> = KeyedLoader::new(cache, LoaderPolicy::default());
//! let key = CacheKey::entity("care-plans", "r-1");
//!
//! let fetch = |_token: CancellationToken| async { Ok::<_, BoxError>(vec!["plan-a".to_string()]) };
//! assert!(matches!(loader.load(key.clone(), fetch).await, LoadOutcome::Fetched(_)));
//! assert!(matches!(loader.load(key, fetch).await, LoadOutcome::Hit(_)));
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};
use wardcache_core::{BoxError, CacheKey, Producer};

use crate::cache::TtlCache;
use crate::concurrency::{ConcurrencyDecision, ConcurrencyManager, SharedResult};
use crate::error::LoadError;
use crate::fetch::{CancellableFetcher, FetchOutcome, FetchSession, SessionStatus};
use crate::metrics::record_load;
use crate::policy::LoaderPolicy;

/// Values a [`KeyedLoader`] can load and cache.
pub trait Loadable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Loadable for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Consumer-visible state of a loader.
#[derive(Debug, Clone)]
pub enum LoadState<T> {
    /// Nothing requested, or the last request was cancelled.
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The latest request produced a value.
    Success(T),
    /// The latest request failed. Errors are never cached.
    Error(LoadError),
}

impl<T> LoadState<T> {
    /// Returns `true` while a fetch is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    /// The loaded value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            LoadState::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The last error, if any.
    pub fn error(&self) -> Option<&LoadError> {
        match self {
            LoadState::Error(error) => Some(error),
            _ => None,
        }
    }
}

/// What a single `load` or `refetch` call did.
#[derive(Debug, Clone)]
pub enum LoadOutcome<T> {
    /// Served from a valid cache entry.
    Hit(T),
    /// Fetched and written through to the cache.
    Fetched(T),
    /// The producer failed or timed out.
    Failed(LoadError),
    /// The session was cancelled or superseded; nothing was committed.
    Cancelled,
    /// `refetch` was called before any `load`.
    Idle,
}

impl<T> LoadOutcome<T> {
    /// The value, for hits and fetches.
    pub fn value(&self) -> Option<&T> {
        match self {
            LoadOutcome::Hit(value) | LoadOutcome::Fetched(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the outcome and returns the value, for hits and fetches.
    pub fn into_value(self) -> Option<T> {
        match self {
            LoadOutcome::Hit(value) | LoadOutcome::Fetched(value) => Some(value),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LoadOutcome::Hit(_) => "hit",
            LoadOutcome::Fetched(_) => "fetched",
            LoadOutcome::Failed(_) => "failed",
            LoadOutcome::Cancelled => "cancelled",
            LoadOutcome::Idle => "idle",
        }
    }
}

type SharedProducer<T> = Arc<dyn Producer<T>>;
type Coalescer = Arc<dyn ConcurrencyManager<SharedResult>>;

/// Loads values for one consumer through the shared cache.
pub struct KeyedLoader<T> {
    cache: Arc<TtlCache>,
    ttl: Duration,
    fetcher: CancellableFetcher,
    last: Mutex<Option<(CacheKey, SharedProducer<T>)>>,
    state: watch::Sender<LoadState<T>>,
    coalescer: Option<Coalescer>,
}

impl<T: Loadable> KeyedLoader<T> {
    /// Creates a loader over `cache`.
    ///
    /// Values are written through with the policy's TTL, or the cache's
    /// default TTL when the policy has none.
    pub fn new(cache: Arc<TtlCache>, policy: LoaderPolicy) -> Self {
        let ttl = policy.ttl.unwrap_or(cache.policy().default_ttl);
        let (state, _) = watch::channel(LoadState::Idle);
        Self {
            cache,
            ttl,
            fetcher: CancellableFetcher::with_timeout(policy.timeout),
            last: Mutex::new(None),
            state,
            coalescer: None,
        }
    }

    /// Shares in-flight fetches with other loaders using the same manager.
    pub fn with_concurrency_manager(
        mut self,
        manager: Arc<dyn ConcurrencyManager<SharedResult>>,
    ) -> Self {
        self.coalescer = Some(manager);
        self
    }

    /// TTL used for write-through.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Loads `key`, from the cache when possible.
    ///
    /// Any in-flight session of this loader is cancelled first.
    pub async fn load<P>(&self, key: CacheKey, producer: P) -> LoadOutcome<T>
    where
        P: Producer<T> + 'static,
    {
        let producer: SharedProducer<T> = Arc::new(producer);
        *self.last.lock() = Some((key.clone(), Arc::clone(&producer)));

        if let Some(value) = self.cache.get_as::<T>(&key) {
            let session = self.fetcher.start(key.clone(), |_| {});
            let outcome = self
                .fetcher
                .settle(&session, SessionStatus::Success, || {
                    self.state.send_replace(LoadState::Success(value.clone()));
                })
                .map_or(LoadOutcome::Cancelled, |()| LoadOutcome::Hit(value));
            debug!(%key, "Served load from cache");
            record_load(outcome.label());
            return outcome;
        }

        self.fetch(key, producer).await
    }

    /// Re-runs the last `load`, bypassing the cache read.
    ///
    /// The result is still written through. Returns
    /// [`LoadOutcome::Idle`] when nothing was loaded yet.
    pub async fn refetch(&self) -> LoadOutcome<T> {
        let last = self.last.lock().clone();
        match last {
            Some((key, producer)) => self.fetch(key, producer).await,
            None => LoadOutcome::Idle,
        }
    }

    /// Cancels the in-flight session, if any.
    ///
    /// A loading state goes back to `Idle`. Returns `true` if a session was
    /// cancelled.
    pub fn cancel(&self) -> bool {
        self.fetcher
            .cancel_with(|_| {
                self.state.send_replace(LoadState::Idle);
            })
            .is_some()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<LoadState<T>> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> LoadState<T> {
        self.state.borrow().clone()
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Option<FetchSession> {
        self.fetcher.current()
    }

    async fn fetch(&self, key: CacheKey, producer: SharedProducer<T>) -> LoadOutcome<T> {
        let session = self.fetcher.start(key.clone(), |_| {
            self.state.send_replace(LoadState::Loading);
        });
        let span = info_span!("wardcache.load", key = %key, session = session.id());
        let mut in_flight = InFlight {
            loader: self,
            session: &session,
            finished: false,
        };
        let outcome = match &self.coalescer {
            Some(manager) => {
                let manager = Arc::clone(manager);
                self.fetcher
                    .run_with(&session, |token| coalesced(manager, key, producer, token))
                    .instrument(span)
                    .await
            }
            None => {
                self.fetcher
                    .run(&session, producer.as_ref())
                    .instrument(span)
                    .await
            }
        };
        in_flight.finished = true;

        let outcome = self.commit(&session, outcome);
        record_load(outcome.label());
        outcome
    }

    fn commit(&self, session: &FetchSession, outcome: FetchOutcome<T>) -> LoadOutcome<T> {
        let key = session.key();
        let committed = match outcome {
            FetchOutcome::Cancelled => None,
            FetchOutcome::Completed(Ok(value)) => self
                .fetcher
                .settle(session, SessionStatus::Success, || {
                    if let Err(error) = self.cache.set_as(key.clone(), &value, self.ttl) {
                        warn!(%key, %error, "Loaded value was not cached");
                    }
                    self.state.send_replace(LoadState::Success(value.clone()));
                })
                .map(|()| LoadOutcome::Fetched(value)),
            FetchOutcome::Completed(Err(error)) => self
                .fetcher
                .settle(session, SessionStatus::Error, || {
                    self.state.send_replace(LoadState::Error(error.clone()));
                })
                .map(|()| LoadOutcome::Failed(error)),
        };
        committed.unwrap_or(LoadOutcome::Cancelled)
    }
}

impl<T> fmt::Debug for KeyedLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLoader")
            .field("ttl", &self.ttl)
            .field("fetcher", &self.fetcher)
            .field("coalescing", &self.coalescer.is_some())
            .finish_non_exhaustive()
    }
}

/// Abandons a session whose `load` future is dropped before the producer
/// settles, so the loader does not stay `Loading`.
struct InFlight<'a, T: Loadable> {
    loader: &'a KeyedLoader<T>,
    session: &'a FetchSession,
    finished: bool,
}

impl<T: Loadable> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.loader.fetcher.abandon(self.session, |_| {
            self.loader.state.send_replace(LoadState::Idle);
        });
    }
}

/// Leading fetch of a coalesced key. Dropping it unpublished releases the
/// key so waiting loaders fetch on their own.
struct Leader {
    manager: Coalescer,
    key: CacheKey,
    published: bool,
}

impl Leader {
    fn publish<T: Serialize>(mut self, result: &Result<T, LoadError>) {
        let shared = match result {
            Ok(value) => match serde_json::to_value(value) {
                Ok(json) => Ok(json),
                Err(error) => {
                    warn!(key = %self.key, %error, "Coalesced value is not shareable");
                    return;
                }
            },
            Err(error) => Err(error.clone()),
        };
        self.manager.resolve(&self.key, &shared);
        self.published = true;
    }
}

impl Drop for Leader {
    fn drop(&mut self) {
        if !self.published {
            self.manager.cleanup(&self.key);
        }
    }
}

fn coalesced<T: Loadable>(
    manager: Coalescer,
    key: CacheKey,
    producer: SharedProducer<T>,
    token: CancellationToken,
) -> BoxFuture<'static, Result<T, BoxError>> {
    Box::pin(async move {
        match manager.check(&key) {
            ConcurrencyDecision::Proceed => {
                let leader = Leader {
                    manager,
                    key,
                    published: false,
                };
                let result = producer.produce(token).await.map_err(LoadError::from_boxed);
                leader.publish(&result);
                result.map_err(BoxError::from)
            }
            ConcurrencyDecision::Await(waiting) => match waiting.await {
                Ok(Ok(json)) => serde_json::from_value(json)
                    .map_err(|error| BoxError::from(LoadError::Encode(Arc::new(error)))),
                Ok(Err(error)) => Err(BoxError::from(error)),
                Err(error) => {
                    debug!(%key, %error, "Coalesced fetch unavailable, fetching directly");
                    producer.produce(token).await
                }
            },
        }
    })
}
