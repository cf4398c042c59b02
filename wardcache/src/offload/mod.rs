//! Background task execution.
//!
//! Prefetches run off the caller's path. [`OffloadManager`] spawns them on
//! the tokio runtime, deduplicates tasks by cache key, applies a
//! [`TimeoutPolicy`] and optionally bounds how many run at once.
//!
//! ```no_run
//! use wardcache::offload::{OffloadConfig, OffloadManager};
//!
//! # async fn run() {
//! let manager = OffloadManager::new(OffloadConfig::builder().max_concurrent_tasks(4).build());
//! manager.spawn("warmup", async {
//!     // fetch and store something
//! });
//! manager.wait_all().await;
//! # }
//! ```

mod manager;
mod policy;

pub use manager::{OffloadHandle, OffloadKey, OffloadManager};
pub use policy::{OffloadConfig, OffloadConfigBuilder, TimeoutPolicy};
