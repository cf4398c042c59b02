//! Metrics declaration and recording helpers.
//!
//! Every helper has a no-op twin that is compiled when the `metrics`
//! feature is disabled, so call sites never need their own `cfg`.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Cache metrics

    /// Track number of cache hit events.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "wardcache_cache_hit_total",
            "Total number of cache hit events."
        );
        "wardcache_cache_hit_total"
    };
    /// Track number of cache miss events.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "wardcache_cache_miss_total",
            "Total number of cache miss events."
        );
        "wardcache_cache_miss_total"
    };
    /// Track number of reads that found and purged an expired entry.
    pub static ref CACHE_EXPIRED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "wardcache_cache_expired_total",
            "Total number of reads that purged an expired entry."
        );
        "wardcache_cache_expired_total"
    };

    // Loader metrics

    /// Track loader outcomes by kind.
    pub static ref LOAD_OUTCOME_COUNTER: &'static str = {
        metrics::describe_counter!(
            "wardcache_load_total",
            "Total number of loader calls by outcome."
        );
        "wardcache_load_total"
    };

    // Batch metrics

    /// Histogram of batch resolution duration.
    pub static ref BATCH_DURATION: &'static str = {
        metrics::describe_histogram!(
            "wardcache_batch_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of uncached batch resolutions in seconds."
        );
        "wardcache_batch_duration_seconds"
    };
    /// Track number of per-entity lookups issued by batches.
    pub static ref BATCH_LOOKUPS: &'static str = {
        metrics::describe_counter!(
            "wardcache_batch_lookups_total",
            "Total number of per-entity lookups issued by batch resolution."
        );
        "wardcache_batch_lookups_total"
    };
    /// Track number of per-entity lookups that failed and fell back to the
    /// default status.
    pub static ref BATCH_LOOKUP_FAILURES: &'static str = {
        metrics::describe_counter!(
            "wardcache_batch_lookup_failures_total",
            "Total number of failed per-entity lookups."
        );
        "wardcache_batch_lookup_failures_total"
    };

    // Offload manager metrics

    /// Track number of offload tasks spawned.
    pub static ref OFFLOAD_TASKS_SPAWNED: &'static str = {
        metrics::describe_counter!(
            "wardcache_offload_tasks_spawned_total",
            "Total number of offload tasks spawned."
        );
        "wardcache_offload_tasks_spawned_total"
    };
    /// Track number of offload tasks completed.
    pub static ref OFFLOAD_TASKS_COMPLETED: &'static str = {
        metrics::describe_counter!(
            "wardcache_offload_tasks_completed_total",
            "Total number of offload tasks completed."
        );
        "wardcache_offload_tasks_completed_total"
    };
    /// Track number of offload tasks that timed out.
    pub static ref OFFLOAD_TASKS_TIMEOUT: &'static str = {
        metrics::describe_counter!(
            "wardcache_offload_tasks_timeout_total",
            "Total number of offload tasks that timed out."
        );
        "wardcache_offload_tasks_timeout_total"
    };
    /// Track number of offload tasks deduplicated (skipped).
    pub static ref OFFLOAD_TASKS_DEDUPLICATED: &'static str = {
        metrics::describe_counter!(
            "wardcache_offload_tasks_deduplicated_total",
            "Total number of offload tasks skipped because one was already in flight."
        );
        "wardcache_offload_tasks_deduplicated_total"
    };
    /// Gauge of currently active offload tasks.
    pub static ref OFFLOAD_TASKS_ACTIVE: &'static str = {
        metrics::describe_gauge!(
            "wardcache_offload_tasks_active",
            "Number of currently active offload tasks."
        );
        "wardcache_offload_tasks_active"
    };
    /// Histogram of offload task duration.
    pub static ref OFFLOAD_TASK_DURATION: &'static str = {
        metrics::describe_histogram!(
            "wardcache_offload_task_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of offload tasks in seconds."
        );
        "wardcache_offload_task_duration_seconds"
    };
}

/// Result of a single cache read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// A valid entry was found.
    Hit,
    /// No entry was stored.
    Miss,
    /// An expired entry was found and purged.
    Expired,
}

/// Records the result of a cache read.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_cache_lookup(lookup: CacheLookup) {
    let counter = match lookup {
        CacheLookup::Hit => *CACHE_HIT_COUNTER,
        CacheLookup::Miss => *CACHE_MISS_COUNTER,
        CacheLookup::Expired => *CACHE_EXPIRED_COUNTER,
    };
    metrics::counter!(counter).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_cache_lookup(_lookup: CacheLookup) {}

/// Records a loader outcome (`hit`, `fetched`, `failed`, `cancelled`, ...).
#[cfg(feature = "metrics")]
#[inline]
pub fn record_load(outcome: &'static str) {
    metrics::counter!(*LOAD_OUTCOME_COUNTER, "outcome" => outcome).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_load(_outcome: &'static str) {}

/// Records an uncached batch resolution.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_batch(lookups: usize, failures: usize, duration: std::time::Duration) {
    metrics::counter!(*BATCH_LOOKUPS).increment(lookups as u64);
    metrics::counter!(*BATCH_LOOKUP_FAILURES).increment(failures as u64);
    metrics::histogram!(*BATCH_DURATION).record(duration.as_secs_f64());
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_batch(_lookups: usize, _failures: usize, _duration: std::time::Duration) {}
