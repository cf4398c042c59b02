//! Test helpers for the wardcache integration tests.
//!
//! - [`mock_lookup`] - an instrumented per-entity lookup that records call
//!   order and peak concurrency
//! - [`mock_producer`] - producers with call counters and test-controlled
//!   release
//! - [`tracing`] - span capture for asserting on instrumentation

pub mod mock_lookup;
pub mod mock_producer;
pub mod tracing;

use chrono::{DateTime, NaiveDate, Utc};

/// Midnight UTC of the given day.
pub fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
