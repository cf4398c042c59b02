//! Cancellable fetch sessions.
//!
//! A consumer owns at most one in-flight fetch. [`CancellableFetcher`] tracks
//! that single [`FetchSession`], cancels it when a new one starts, and only
//! lets the current, uncancelled session commit its result. Anything a
//! superseded session produces is dropped on the floor.
//!
//! ```
//! use wardcache::fetch::{CancellableFetcher, SessionStatus};
//! use wardcache::CacheKey;
//!
//! let fetcher = CancellableFetcher::new();
//! let stale = fetcher.start(CacheKey::entity("residents", "r-1"), |_| {});
//! let fresh = fetcher.start(CacheKey::entity("residents", "r-2"), |_| {});
//!
//! assert!(stale.is_cancelled());
//! assert!(fetcher.settle(&stale, SessionStatus::Success, || ()).is_none());
//! assert!(fetcher.settle(&fresh, SessionStatus::Success, || ()).is_some());
//! ```

mod cancellable;
mod fetcher;
mod session;

pub use cancellable::{Cancellable, CancellableExt};
pub use fetcher::{CancellableFetcher, FetchOutcome};
pub use session::{FetchSession, SessionStatus};
