//! Traits for the async data sources the cache fronts.
//!
//! The host application supplies two kinds of fetch functions:
//!
//! - [`Producer`] - a zero-argument fetch for one cache key, handed the
//!   session's [`CancellationToken`] so it can abandon work early
//! - [`Lookup`] - a per-entity fetch used by batch resolution
//!
//! Both are implemented for plain closures returning futures, so callers
//! rarely implement them by hand:
//!
//! ```
//! use tokio_util::sync::CancellationToken;
//! use wardcache_core::{BoxError, Lookup, Producer};
//!
//! fn assert_producer<P: Producer<Vec<u32>>>(_: P) {}
//! fn assert_lookup<L: Lookup<u32, String>>(_: L) {}
//!
//! assert_producer(|_token: CancellationToken| async { Ok::<_, BoxError>(vec![1, 2, 3]) });
//! assert_lookup(|id: u32| async move { Ok::<_, std::io::Error>(id.to_string()) });
//! ```

use std::error::Error;
use std::future::Future;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Boxed error returned by user-supplied producers and lookups.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// A fetch for a single cache key.
///
/// Producers are called once per fetch session. The token is cancelled when
/// the session is replaced or the consumer detaches; producers that talk to
/// a transport with real abort support should forward it.
pub trait Producer<T>: Send + Sync {
    /// Starts a fetch.
    fn produce(&self, token: CancellationToken) -> BoxFuture<'static, Result<T, BoxError>>;
}

impl<T, F, Fut, E> Producer<T> for F
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn produce(&self, token: CancellationToken) -> BoxFuture<'static, Result<T, BoxError>> {
        let fut = (self)(token);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

/// A per-entity fetch used by batch resolution.
///
/// A failing lookup only affects its own entity; see the batch resolver for
/// how failures are isolated.
pub trait Lookup<I, R>: Send + Sync {
    /// Fetches the records for `id`.
    fn lookup(&self, id: I) -> BoxFuture<'static, Result<R, BoxError>>;
}

impl<I, R, F, Fut, E> Lookup<I, R> for F
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn lookup(&self, id: I) -> BoxFuture<'static, Result<R, BoxError>> {
        let fut = (self)(id);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}
