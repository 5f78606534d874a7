//! Core domain types for gradreach pipeline runs.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Literal the collector uses for "no value" (matched case-insensitively).
pub const MISSING_SENTINEL: &str = "none";

/// Invalid ratio above which the review stage asks for re-collection.
pub const RECOLLECTION_THRESHOLD: f64 = 0.25;

/// True when `value` is the "missing" placeholder (`None`, `none`, ...).
pub fn is_missing(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(MISSING_SENTINEL)
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying a single pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ContactRecord
// ---------------------------------------------------------------------------

/// A single collected contact, as decoded from collector output.
///
/// `email` is `None` when the collector emitted `null` or left the field
/// out. `outreach_message` stays `None` until message composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Full name, free-form.
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    /// Email address, if the collector found one.
    pub email: Option<String>,
    /// Composed outreach text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outreach_message: Option<String>,
}

impl ContactRecord {
    /// Build a record without a composed message.
    pub fn new(name: impl Into<String>, email: Option<String>) -> Self {
        Self {
            name: name.into(),
            email,
            outreach_message: None,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// ValidationVerdict
// ---------------------------------------------------------------------------

/// Outcome of validating one batch of collected records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationVerdict {
    /// Records that passed, in input order.
    pub valid_records: Vec<ContactRecord>,
    /// Number of rejected records.
    pub invalid_count: usize,
    /// Number of records inspected.
    pub total_count: usize,
    /// Emails seen more than once among the valid records (lowercased,
    /// first-occurrence order). Flagged only, never removed.
    pub duplicate_emails: Vec<String>,
}

impl ValidationVerdict {
    /// `invalid_count / total_count`, or 0 for an empty batch.
    pub fn invalid_ratio(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.invalid_count as f64 / self.total_count as f64
        }
    }

    /// True when the invalid ratio is strictly above [`RECOLLECTION_THRESHOLD`].
    pub fn requires_recollection(&self) -> bool {
        self.invalid_ratio() > RECOLLECTION_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn missing_sentinel_is_case_insensitive() {
        assert!(is_missing("None"));
        assert!(is_missing(" NONE "));
        assert!(is_missing("none"));
        assert!(!is_missing("Nonez"));
        assert!(!is_missing(""));
    }

    #[test]
    fn contact_accepts_null_and_absent_email() {
        let json = r#"[{"name":"Jo Lee","email":null},{"name":"Ana Smith"}]"#;
        let records: Vec<ContactRecord> = serde_json::from_str(json).expect("deserialize");
        assert_eq!(records.len(), 2);
        assert!(records[0].email.is_none());
        assert!(records[1].email.is_none());
    }

    #[test]
    fn contact_null_name_becomes_empty() {
        let json = r#"{"name":null,"email":"x@iastate.edu"}"#;
        let record: ContactRecord = serde_json::from_str(json).expect("deserialize");
        assert_eq!(record.name, "");
    }

    #[test]
    fn contact_requires_name_field() {
        let json = r#"{"email":"x@iastate.edu"}"#;
        assert!(serde_json::from_str::<ContactRecord>(json).is_err());
    }

    #[test]
    fn outreach_message_not_serialized_when_absent() {
        let record = ContactRecord::new("Jo Lee", Some("jo@iastate.edu".into()));
        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(json, r#"{"name":"Jo Lee","email":"jo@iastate.edu"}"#);
    }

    #[test]
    fn verdict_ratio_and_threshold() {
        let empty = ValidationVerdict::default();
        assert_eq!(empty.invalid_ratio(), 0.0);
        assert!(!empty.requires_recollection());

        let at_threshold = ValidationVerdict {
            invalid_count: 1,
            total_count: 4,
            ..Default::default()
        };
        assert_eq!(at_threshold.invalid_ratio(), 0.25);
        assert!(!at_threshold.requires_recollection());

        let above = ValidationVerdict {
            invalid_count: 1,
            total_count: 2,
            ..Default::default()
        };
        assert!(above.requires_recollection());
    }
}
