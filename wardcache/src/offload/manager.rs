//! OffloadManager implementation.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use smol_str::SmolStr;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};
use wardcache_core::{CacheKey, Offload};

use super::policy::{OffloadConfig, TimeoutPolicy};

#[cfg(feature = "metrics")]
use crate::metrics::{
    OFFLOAD_TASK_DURATION, OFFLOAD_TASKS_ACTIVE, OFFLOAD_TASKS_COMPLETED,
    OFFLOAD_TASKS_DEDUPLICATED, OFFLOAD_TASKS_SPAWNED, OFFLOAD_TASKS_TIMEOUT,
};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Key for identifying offloaded tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OffloadKey {
    /// Task working on a cache key; subject to deduplication.
    Cache(CacheKey),
    /// Auto-generated key for ad hoc tasks.
    Generated {
        /// Kind of the task (e.g. "prefetch", "sweep").
        kind: SmolStr,
        /// Unique identifier within the manager.
        id: u64,
    },
}

impl OffloadKey {
    /// Label used in traces and metrics: `cache` or the task kind.
    pub fn key_type(&self) -> SmolStr {
        match self {
            Self::Cache(_) => SmolStr::new_static("cache"),
            Self::Generated { kind, .. } => kind.clone(),
        }
    }
}

impl From<CacheKey> for OffloadKey {
    fn from(key: CacheKey) -> Self {
        Self::Cache(key)
    }
}

/// Handle to a spawned offload task.
#[derive(Debug)]
pub struct OffloadHandle {
    task_id: u64,
    handle: JoinHandle<()>,
}

impl OffloadHandle {
    /// Returns `true` once the task has finished or was aborted.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Aborts the task.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
struct OffloadManagerInner {
    config: OffloadConfig,
    tasks: DashMap<OffloadKey, OffloadHandle>,
    counter: AtomicU64,
    slots: Option<Arc<Semaphore>>,
}

/// Spawns and tracks background tasks.
///
/// Clones share the same task registry.
#[derive(Clone, Debug)]
pub struct OffloadManager {
    inner: Arc<OffloadManagerInner>,
}

impl OffloadManager {
    /// Creates a manager with the given configuration.
    pub fn new(config: OffloadConfig) -> Self {
        let slots = config
            .max_concurrent_tasks
            .map(|max| Arc::new(Semaphore::new(max.max(1))));
        Self {
            inner: Arc::new(OffloadManagerInner {
                config,
                tasks: DashMap::new(),
                counter: AtomicU64::new(0),
                slots,
            }),
        }
    }

    /// Creates a manager with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(OffloadConfig::default())
    }

    /// The manager's configuration.
    pub fn config(&self) -> &OffloadConfig {
        &self.inner.config
    }

    fn next_id(&self) -> u64 {
        self.inner.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawns a task under an auto-generated key of the given kind.
    pub fn spawn<F>(&self, kind: impl Into<SmolStr>, task: F) -> OffloadKey
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = OffloadKey::Generated {
            kind: kind.into(),
            id: self.next_id(),
        };
        self.spawn_with_key(key.clone(), task);
        key
    }

    /// Spawns a task under `key`.
    ///
    /// When deduplication is enabled and an unfinished task with the same
    /// cache key exists, the new task is dropped without running.
    ///
    /// Returns `true` if the task was spawned.
    pub fn spawn_with_key<K, F>(&self, key: K, task: F) -> bool
    where
        K: Into<OffloadKey>,
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let deduplicate = self.inner.config.deduplicate && matches!(key, OffloadKey::Cache(_));

        // The registry entry stays locked until the handle is stored, so the
        // task cannot unregister itself before it is registered.
        match self.inner.tasks.entry(key.clone()) {
            Entry::Occupied(entry) if deduplicate && !entry.get().is_finished() => {
                debug!(?key, "Task deduplicated - already in flight");
                #[cfg(feature = "metrics")]
                metrics::counter!(*OFFLOAD_TASKS_DEDUPLICATED, "key_type" => key.key_type().to_string())
                    .increment(1);
                return false;
            }
            Entry::Occupied(mut entry) => {
                entry.insert(self.spawn_inner(task, key.clone()));
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn_inner(task, key.clone()));
            }
        }

        #[cfg(feature = "metrics")]
        {
            let key_type = key.key_type();
            metrics::counter!(*OFFLOAD_TASKS_SPAWNED, "key_type" => key_type.to_string())
                .increment(1);
            metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "key_type" => key_type.to_string())
                .increment(1.0);
        }

        true
    }

    /// Number of tracked tasks that have not finished.
    pub fn active_task_count(&self) -> usize {
        self.inner.tasks.iter().filter(|e| !e.is_finished()).count()
    }

    /// Drops handles of finished tasks.
    pub fn cleanup_finished(&self) {
        self.inner.tasks.retain(|_, handle| !handle.is_finished());
    }

    /// Aborts every tracked task.
    pub fn cancel_all(&self) {
        for entry in self.inner.tasks.iter() {
            entry.abort();
        }
    }

    /// Aborts the task registered under `key`.
    pub fn cancel(&self, key: &OffloadKey) -> bool {
        match self.inner.tasks.get(key) {
            Some(entry) => {
                entry.abort();
                true
            }
            None => false,
        }
    }

    /// Returns `true` while a task registered under `key` is running.
    pub fn is_in_flight(&self, key: &OffloadKey) -> bool {
        self.inner.tasks.get(key).is_some_and(|h| !h.is_finished())
    }

    /// Waits until every tracked task has finished.
    ///
    /// Polls the registry on a timer, so a paused test clock still advances.
    pub async fn wait_all(&self) {
        loop {
            self.cleanup_finished();
            if self.inner.tasks.is_empty() {
                break;
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Like [`wait_all`](Self::wait_all) with an upper bound. Returns
    /// `false` if tasks were still running when `timeout` elapsed.
    pub async fn wait_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_all()).await.is_ok()
    }

    fn spawn_inner<F>(&self, task: F, key: OffloadKey) -> OffloadHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task_id = self.next_id();
        let timeout_policy = self.inner.config.timeout_policy;
        let slots = self.inner.slots.clone();
        let inner = Arc::clone(&self.inner);
        let key_type = key.key_type();

        let span = info_span!(
            "offload_task",
            key_type = %key_type,
            key = ?key,
        );

        let handle = tokio::spawn(
            async move {
                let _slot = match slots {
                    Some(slots) => slots.acquire_owned().await.ok(),
                    None => None,
                };
                let start = Instant::now();
                let timed_out = match timeout_policy {
                    TimeoutPolicy::None => {
                        task.await;
                        false
                    }
                    TimeoutPolicy::Cancel(limit) => {
                        let timed_out = tokio::time::timeout(limit, task).await.is_err();
                        if timed_out {
                            warn!(?key, "Offload task cancelled due to timeout");
                        }
                        timed_out
                    }
                    TimeoutPolicy::Warn(limit) => {
                        task.await;
                        let elapsed = start.elapsed();
                        if elapsed > limit {
                            warn!(
                                ?key,
                                elapsed_ms = elapsed.as_millis(),
                                threshold_ms = limit.as_millis(),
                                "Offload task exceeded timeout threshold"
                            );
                        }
                        false
                    }
                };
                inner
                    .tasks
                    .remove_if(&key, |_, handle| handle.task_id == task_id);
                #[cfg(feature = "metrics")]
                Self::record_finish(start, &key_type, timed_out);
                #[cfg(not(feature = "metrics"))]
                let _ = (timed_out, key_type);
            }
            .instrument(span),
        );

        OffloadHandle { task_id, handle }
    }

    #[cfg(feature = "metrics")]
    fn record_finish(start: Instant, key_type: &SmolStr, timed_out: bool) {
        let duration = start.elapsed().as_secs_f64();
        let counter = if timed_out {
            *OFFLOAD_TASKS_TIMEOUT
        } else {
            *OFFLOAD_TASKS_COMPLETED
        };
        metrics::counter!(counter, "key_type" => key_type.to_string()).increment(1);
        metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "key_type" => key_type.to_string()).decrement(1.0);
        metrics::histogram!(*OFFLOAD_TASK_DURATION, "key_type" => key_type.to_string())
            .record(duration);
    }
}

impl Default for OffloadManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Offload for OffloadManager {
    fn spawn<F>(&self, kind: impl Into<SmolStr>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        OffloadManager::spawn(self, kind, future);
    }

    fn spawn_keyed<F>(&self, key: CacheKey, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_with_key(key, future)
    }
}
