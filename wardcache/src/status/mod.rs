//! Assignment records and the status-selection policy.
//!
//! Records are normalized once at the ingestion boundary
//! ([`RawAssignment`] → [`AssignmentCandidate`]); [`select_status`] only ever
//! sees the canonical shape and is a pure function of its candidates and
//! `now`.

mod candidate;
mod select;

pub use candidate::{
    ACTIVE_STATUSES, AssignmentCandidate, CANCELLED_STATUSES, RawAssignment, StatusClass,
};
pub use select::{ResolvedStatus, select_status};
