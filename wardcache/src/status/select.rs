use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::{AssignmentCandidate, StatusClass};

/// Per-entity assignment status derived from its candidates.
///
/// The default value (`no assignment, not expired, no end date`) is also what
/// a failed lookup resolves to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStatus {
    /// The entity holds an assignment that blocks a new one.
    pub has_assignment: bool,
    /// The chosen assignment ended before now.
    pub is_expired: bool,
    /// End of the chosen assignment's window.
    pub end_date: Option<DateTime<Utc>>,
}

/// Picks the representative candidate and derives the entity's status.
///
/// Cancelled-like records are ignored. Active-like records win over all
/// others; within the chosen pool the record with the latest `end_date`
/// (then latest `start_date`, absent dates lowest) is taken, ties keeping
/// input order. A pending or future assignment does not block.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use wardcache::status::{AssignmentCandidate, select_status};
///
/// let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
/// let end = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
/// let status = select_status(&[AssignmentCandidate::new("active", None, Some(end))], now);
///
/// assert!(status.has_assignment);
/// assert!(!status.is_expired);
/// assert_eq!(status.end_date, Some(end));
/// ```
pub fn select_status(candidates: &[AssignmentCandidate], now: DateTime<Utc>) -> ResolvedStatus {
    let (active, other): (Vec<&AssignmentCandidate>, Vec<&AssignmentCandidate>) = candidates
        .iter()
        .filter(|candidate| candidate.class() != StatusClass::Cancelled)
        .partition(|candidate| candidate.class() == StatusClass::Active);

    let is_active = !active.is_empty();
    let mut pool = if is_active { active } else { other };
    pool.sort_by_key(|candidate| Reverse((candidate.end_date, candidate.start_date)));

    let Some(chosen) = pool.first() else {
        return ResolvedStatus::default();
    };

    let started = chosen.start_date.is_none_or(|start| start <= now);
    let not_ended = chosen.end_date.is_none_or(|end| end >= now);

    if is_active && started && not_ended {
        return ResolvedStatus {
            has_assignment: true,
            is_expired: false,
            end_date: chosen.end_date,
        };
    }
    match chosen.end_date {
        Some(end) if end < now => ResolvedStatus {
            has_assignment: true,
            is_expired: true,
            end_date: Some(end),
        },
        end_date => ResolvedStatus {
            has_assignment: false,
            is_expired: false,
            end_date,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn day(month: u32, day: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap())
    }

    fn candidate(
        status: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AssignmentCandidate {
        AssignmentCandidate::new(status, start, end)
    }

    #[test]
    fn test_no_candidates_means_no_assignment() {
        assert_eq!(select_status(&[], now()), ResolvedStatus::default());
    }

    #[test]
    fn test_only_cancelled_means_no_assignment() {
        let candidates = [
            candidate("cancelled", day(1, 1), day(12, 31)),
            candidate("VOID", None, None),
        ];
        assert_eq!(select_status(&candidates, now()), ResolvedStatus::default());
    }

    #[test]
    fn test_active_beats_later_other() {
        let candidates = [
            candidate("completed", day(1, 1), day(11, 30)),
            candidate("active", day(5, 1), day(7, 1)),
        ];
        assert_eq!(
            select_status(&candidates, now()),
            ResolvedStatus {
                has_assignment: true,
                is_expired: false,
                end_date: day(7, 1),
            }
        );
    }

    #[test]
    fn test_latest_end_date_wins_then_latest_start() {
        let candidates = [
            candidate("active", day(1, 1), day(5, 1)),
            candidate("active", day(2, 1), day(8, 1)),
            candidate("active", day(3, 1), day(8, 1)),
            candidate("active", day(4, 1), None),
        ];
        let status = select_status(&candidates, now());
        assert_eq!(status.end_date, day(8, 1));
        assert!(status.has_assignment);
    }

    #[test]
    fn test_past_end_date_is_expired() {
        let candidates = [candidate("active", day(1, 1), day(3, 1))];
        assert_eq!(
            select_status(&candidates, now()),
            ResolvedStatus {
                has_assignment: true,
                is_expired: true,
                end_date: day(3, 1),
            }
        );
    }

    #[test]
    fn test_future_assignment_does_not_block() {
        let candidates = [candidate("active", day(9, 1), day(12, 31))];
        assert_eq!(
            select_status(&candidates, now()),
            ResolvedStatus {
                has_assignment: false,
                is_expired: false,
                end_date: day(12, 31),
            }
        );
    }

    #[test]
    fn test_other_pool_is_used_without_active() {
        let expired_other = [candidate("pending", None, day(2, 1))];
        assert!(select_status(&expired_other, now()).is_expired);

        let open_other = [candidate("pending", None, None)];
        assert_eq!(select_status(&open_other, now()), ResolvedStatus::default());
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let candidates = [candidate("active", Some(now()), Some(now()))];
        let status = select_status(&candidates, now());
        assert!(status.has_assignment);
        assert!(!status.is_expired);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let candidates = [
            candidate("pending", day(1, 1), None),
            candidate("active", day(2, 1), day(9, 1)),
            candidate("rejected", day(3, 1), day(12, 1)),
        ];
        assert_eq!(
            select_status(&candidates, now()),
            select_status(&candidates, now())
        );
    }
}
