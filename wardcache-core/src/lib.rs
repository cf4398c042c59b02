#![warn(missing_docs)]
//! # wardcache-core
//!
//! Core types and traits for the wardcache lookup cache.
//!
//! This crate holds the pieces with no I/O and no runtime coupling:
//!
//! - **Keys** - structured composite cache keys ([`CacheKey`], [`KeyPart`])
//! - **Entries** - values with storage time and TTL ([`CacheEntry`])
//! - **Time** - an injectable [`Clock`]
//! - **Sources** - the async fetch functions the host supplies
//!   ([`Producer`], [`Lookup`])
//! - **Background work** - the [`Offload`] trait used for prefetching
//!
//! ## Feature Flags
//!
//! - `test-helpers` - Enables [`MockClock`] for deterministic tests
//!

pub mod clock;
pub mod entry;
pub mod key;
pub mod offload;
pub mod producer;

#[cfg(feature = "test-helpers")]
pub use clock::MockClock;
pub use clock::{Clock, SharedClock, SystemClock, system_clock};
pub use entry::{CacheEntry, EntryState};
pub use key::{CacheKey, KeyPart};
pub use offload::Offload;
pub use producer::{BoxError, Lookup, Producer};
#[doc(hidden)]
pub use smol_str::SmolStr;
pub use tokio_util::sync::CancellationToken;
