use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Statuses that mean "the resident currently holds this assignment".
pub const ACTIVE_STATUSES: &[&str] = &["active", "room_assigned", "payment_completed"];

/// Statuses that remove a record from consideration entirely.
pub const CANCELLED_STATUSES: &[&str] = &["cancelled", "canceled", "rejected", "void", "deleted"];

/// Classification of a normalized status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// Currently held assignment.
    Active,
    /// Withdrawn record; ignored by the policy.
    Cancelled,
    /// Anything else (pending, completed, ...).
    Other,
}

impl StatusClass {
    /// Classifies an already normalized status.
    pub fn of(status: &str) -> Self {
        if ACTIVE_STATUSES.contains(&status) {
            StatusClass::Active
        } else if CANCELLED_STATUSES.contains(&status) {
            StatusClass::Cancelled
        } else {
            StatusClass::Other
        }
    }
}

/// Assignment record as it arrives from the API.
///
/// Accepts both camelCase and snake_case field names, `state` as an alias of
/// `status`, and `null` for any field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAssignment {
    /// Free-form status string.
    #[serde(default, alias = "state")]
    pub status: Option<String>,
    /// Start of the assignment window.
    #[serde(default, alias = "startDate")]
    pub start_date: Option<String>,
    /// End of the assignment window.
    #[serde(default, alias = "endDate")]
    pub end_date: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Envelope { data: Vec<RawAssignment> },
    Many(Vec<RawAssignment>),
    One(RawAssignment),
}

/// Normalized assignment record consumed by
/// [`select_status`](super::select_status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentCandidate {
    /// Trimmed, lowercase status.
    pub status: String,
    /// Start of the window, if known.
    pub start_date: Option<DateTime<Utc>>,
    /// End of the window, if known.
    pub end_date: Option<DateTime<Utc>>,
}

impl AssignmentCandidate {
    /// Creates a candidate, normalizing the status.
    pub fn new(
        status: impl AsRef<str>,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            status: status.as_ref().trim().to_lowercase(),
            start_date,
            end_date,
        }
    }

    /// Classification of this candidate's status.
    pub fn class(&self) -> StatusClass {
        StatusClass::of(&self.status)
    }

    /// Decodes candidates from an API payload.
    ///
    /// The payload may be a single record, an array of records, or an
    /// envelope `{ "data": [...] }`. `null` decodes to no candidates.
    pub fn from_json(value: Value) -> Result<Vec<Self>, serde_json::Error> {
        if value.is_null() {
            return Ok(Vec::new());
        }
        let raw = match serde_json::from_value(value)? {
            Payload::Envelope { data } | Payload::Many(data) => data,
            Payload::One(one) => vec![one],
        };
        Ok(raw.into_iter().map(Self::from).collect())
    }
}

impl From<RawAssignment> for AssignmentCandidate {
    fn from(raw: RawAssignment) -> Self {
        Self::new(
            raw.status.as_deref().unwrap_or_default(),
            parse_date(raw.start_date.as_deref(), "start_date"),
            parse_date(raw.end_date.as_deref(), "end_date"),
        )
    }
}

/// Parses a date-only (`2024-01-31`, midnight UTC), naive datetime (taken
/// as UTC) or RFC 3339 string. Empty and unparseable input is absent.
fn parse_date(raw: Option<&str>, field: &'static str) -> Option<DateTime<Utc>> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc());
    }
    debug!(field, raw, "Ignoring unparseable assignment date");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_field_aliases_and_normalization() {
        let candidates = AssignmentCandidate::from_json(json!({
            "state": "  Room_Assigned ",
            "startDate": "2024-01-01",
            "endDate": "2024-06-30T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(
            candidates,
            vec![AssignmentCandidate {
                status: "room_assigned".into(),
                start_date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
                end_date: Some(Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()),
            }]
        );
        assert_eq!(candidates[0].class(), StatusClass::Active);
    }

    #[test]
    fn test_payload_shapes() {
        let one = json!({"status": "active"});
        let many = json!([{"status": "active"}, {"status": "pending"}]);
        let envelope = json!({"data": [{"status": "void"}]});

        assert_eq!(AssignmentCandidate::from_json(one).unwrap().len(), 1);
        assert_eq!(AssignmentCandidate::from_json(many).unwrap().len(), 2);
        assert_eq!(
            AssignmentCandidate::from_json(envelope).unwrap()[0].class(),
            StatusClass::Cancelled
        );
        assert!(AssignmentCandidate::from_json(Value::Null).unwrap().is_empty());
        assert!(AssignmentCandidate::from_json(json!(42)).is_err());
    }

    #[test]
    fn test_null_empty_and_garbage_dates_are_absent() {
        let candidates = AssignmentCandidate::from_json(json!([
            {"status": "active", "start_date": null, "end_date": ""},
            {"status": "active", "start_date": "not a date", "end_date": "  "},
        ]))
        .unwrap();

        for candidate in candidates {
            assert_eq!(candidate.start_date, None);
            assert_eq!(candidate.end_date, None);
        }
    }

    #[test]
    fn test_rfc3339_offsets_are_converted_to_utc() {
        let parsed = parse_date(Some("2024-03-01T02:00:00+02:00"), "end_date");
        assert_eq!(parsed, Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_status_classes() {
        assert_eq!(StatusClass::of("payment_completed"), StatusClass::Active);
        assert_eq!(StatusClass::of("canceled"), StatusClass::Cancelled);
        assert_eq!(StatusClass::of("pending"), StatusClass::Other);
        assert_eq!(StatusClass::of(""), StatusClass::Other);
    }
}
