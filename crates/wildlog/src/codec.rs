//! Import and export of observation documents.
//!
//! Exports are pretty-printed JSON arrays of observations. Imports go through
//! two stages: the document is parsed into loosely typed [`RawObservation`]
//! records, which are then coerced into strict [`Observation`]s with defaults
//! filled in for missing optional fields.
//!
//! Dates are written as midnight UTC. Documents from tools that wrote local
//! midnight as a UTC instant are read back to the intended day for writers
//! between UTC-11 and UTC+12; outside that range a date can land one day off.

use std::fmt;
use std::path::Path;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::observation::{instant_to_date, new_id, now_timestamp, parse_date, Observation};

/// File name suggested for exports.
pub const DEFAULT_EXPORT_FILENAME: &str = "wildlife-observations.json";

/// What to do with an imported record whose date cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidDatePolicy {
    /// Fail the whole import.
    #[default]
    Reject,
    /// Drop the record and keep going.
    Skip,
}

impl fmt::Display for InvalidDatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => write!(f, "reject"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// An imported record before coercion.
///
/// Every field is optional and untyped; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawObservation {
    /// Identifier, if the record has one.
    pub id: Option<Value>,
    /// Species name.
    pub species: Option<Value>,
    /// Location text.
    pub location: Option<Value>,
    /// Date as a timestamp string, a plain date or epoch milliseconds.
    pub date: Option<Value>,
    /// Notes.
    pub notes: Option<Value>,
    /// Photo payload.
    pub photo: Option<Value>,
    /// Creation timestamp.
    pub timestamp: Option<Value>,
}

/// Why a single record could not be coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordIssue {
    /// The element is not a JSON object.
    NotAnObject,
    /// A required text field is missing or empty.
    MissingField(&'static str),
    /// The date is absent or unparseable.
    InvalidDate(String),
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "not an object"),
            Self::MissingField(field) => write!(f, "missing {field}"),
            Self::InvalidDate(raw) => write!(f, "invalid date {raw}"),
        }
    }
}

impl RawObservation {
    /// Coerce into a strict observation.
    ///
    /// A missing id gets a fresh one, a missing timestamp gets the current
    /// instant, missing notes become empty and an empty photo becomes absent.
    ///
    /// # Errors
    ///
    /// Returns the first problem that prevents coercion.
    pub fn normalize(self) -> std::result::Result<Observation, RecordIssue> {
        let species = text(self.species).ok_or(RecordIssue::MissingField("species"))?;
        let location = text(self.location).ok_or(RecordIssue::MissingField("location"))?;
        let date = match &self.date {
            Some(value) => coerce_date(value)
                .ok_or_else(|| RecordIssue::InvalidDate(value.to_string()))?,
            None => return Err(RecordIssue::InvalidDate("(missing)".to_string())),
        };

        Ok(Observation {
            id: text(self.id).unwrap_or_else(new_id),
            species,
            location,
            date,
            notes: text(self.notes).unwrap_or_default(),
            photo: text(self.photo),
            timestamp: text(self.timestamp).unwrap_or_else(now_timestamp),
        })
    }
}

/// A non-empty string out of a loose value. Numbers are stringified.
fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_date(value: &Value) -> Option<chrono::NaiveDate> {
    match value {
        Value::String(s) => parse_date(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .and_then(instant_to_date),
        _ => None,
    }
}

/// Serialize observations as an indented JSON document.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export(observations: &[Observation]) -> Result<String> {
    let document = serde_json::to_string_pretty(observations)?;
    debug!("Exported {} observations", observations.len());
    Ok(document)
}

/// Parse an import document into normalized observations.
///
/// The result is not deduplicated against anything; merging is the store's job.
///
/// # Errors
///
/// Returns a format error if the document is not a JSON array, or if any
/// record cannot be coerced (records with bad dates are dropped instead
/// under [`InvalidDatePolicy::Skip`]). All record problems are reported
/// together in one error.
pub fn import(document: &str, policy: InvalidDatePolicy) -> Result<Vec<Observation>> {
    let parsed: Value = serde_json::from_str(document)
        .map_err(|e| Error::format(format!("document is not valid JSON: {e}")))?;

    let Value::Array(items) = parsed else {
        return Err(Error::format("imported data is not an array"));
    };

    let mut observations = Vec::with_capacity(items.len());
    let mut problems = Vec::new();
    let mut skipped = 0usize;

    for (index, item) in items.into_iter().enumerate() {
        let raw = match item {
            Value::Object(_) => serde_json::from_value::<RawObservation>(item)
                .map_err(|_| RecordIssue::NotAnObject),
            _ => Err(RecordIssue::NotAnObject),
        };

        match raw.and_then(RawObservation::normalize) {
            Ok(observation) => observations.push(observation),
            Err(RecordIssue::InvalidDate(raw_date)) if policy == InvalidDatePolicy::Skip => {
                warn!("Skipping record {index}: invalid date {raw_date}");
                skipped += 1;
            }
            Err(issue) => problems.push(format!("record {index}: {issue}")),
        }
    }

    if !problems.is_empty() {
        return Err(Error::format(problems.join("; ")));
    }

    info!(
        "Imported {} observations ({} skipped)",
        observations.len(),
        skipped
    );
    Ok(observations)
}

/// Write an export document to `path`.
///
/// # Errors
///
/// Returns an error if serialization or the file write fails.
pub fn export_to_file(observations: &[Observation], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let document = export(observations)?;
    std::fs::write(path, document).map_err(|source| Error::file(path, source))?;
    info!(
        "Exported {} observations to {}",
        observations.len(),
        path.display()
    );
    Ok(())
}

/// Read and import the document at `path`.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or a format error as
/// described in [`import`].
pub fn import_from_file(path: impl AsRef<Path>, policy: InvalidDatePolicy) -> Result<Vec<Observation>> {
    let path = path.as_ref();
    let document = std::fs::read_to_string(path).map_err(|source| Error::file(path, source))?;
    import(&document, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_list() -> Vec<Observation> {
        vec![
            Observation::new("Red Fox", "Discovery Park, 47.6612, -122.4060", ymd(2023, 3, 1))
                .with_notes("Hunting voles in the tall grass.")
                .with_photo("data:image/png;base64,iVBORw0KGgo="),
            Observation::new("Raccoon", "Seward Park", ymd(2023, 1, 1)),
        ]
    }

    #[test]
    fn test_export_is_indented_array() {
        let document = export(&sample_list()).unwrap();
        assert!(document.starts_with("[\n  {"));
        assert!(document.contains("\"date\": \"2023-03-01T00:00:00.000Z\""));
        assert!(document.contains("\"photo\": \"data:image/png;base64,iVBORw0KGgo=\""));
    }

    #[test]
    fn test_export_omits_absent_photo() {
        let list = vec![Observation::new("Raccoon", "Seward Park", ymd(2023, 1, 1))];
        let document = export(&list).unwrap();
        assert!(!document.contains("photo"));
    }

    #[test]
    fn test_round_trip_is_exact() {
        let list = sample_list();
        let document = export(&list).unwrap();
        let imported = import(&document, InvalidDatePolicy::Reject).unwrap();
        assert_eq!(imported, list);
    }

    #[test]
    fn test_import_rejects_non_array() {
        let err = import(r#"{"not":"an array"}"#, InvalidDatePolicy::Reject).unwrap_err();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("not an array"));
    }

    #[test]
    fn test_import_rejects_invalid_json() {
        let err = import("[{", InvalidDatePolicy::Reject).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_import_empty_array() {
        assert!(import("[]", InvalidDatePolicy::Reject).unwrap().is_empty());
    }

    #[test]
    fn test_import_fills_missing_fields() {
        let document = r#"[{"species": "Coyote", "location": "Magnuson Park", "date": "2023-02-10"}]"#;
        let imported = import(document, InvalidDatePolicy::Reject).unwrap();

        assert_eq!(imported.len(), 1);
        let obs = &imported[0];
        assert!(!obs.id.is_empty());
        assert!(DateTime::parse_from_rfc3339(&obs.timestamp).is_ok());
        assert_eq!(obs.notes, "");
        assert!(obs.photo.is_none());
        assert_eq!(obs.date, ymd(2023, 2, 10));
    }

    #[test]
    fn test_import_generates_distinct_ids() {
        let document = r#"[
            {"species": "Coyote", "location": "Park", "date": "2023-02-10"},
            {"species": "Coyote", "location": "Park", "date": "2023-02-10", "id": ""}
        ]"#;
        let imported = import(document, InvalidDatePolicy::Reject).unwrap();
        assert_ne!(imported[0].id, imported[1].id);
    }

    #[test]
    fn test_import_preserves_id_and_timestamp() {
        let document = r#"[{
            "id": "7",
            "species": "Bald Eagle",
            "location": "Golden Gardens",
            "date": "2023-10-05T00:00:00.000Z",
            "notes": "Soaring",
            "photo": "",
            "timestamp": "2023-10-05T08:15:00.000Z"
        }]"#;
        let obs = import(document, InvalidDatePolicy::Reject).unwrap().remove(0);

        assert_eq!(obs.id, "7");
        assert_eq!(obs.timestamp, "2023-10-05T08:15:00.000Z");
        assert_eq!(obs.notes, "Soaring");
        assert!(obs.photo.is_none());
    }

    #[test]
    fn test_import_numeric_id_and_epoch_date() {
        // 1675987200000 ms = 2023-02-10T00:00:00Z
        let document = r#"[{"id": 42, "species": "Coyote", "location": "Park", "date": 1675987200000}]"#;
        let obs = import(document, InvalidDatePolicy::Reject).unwrap().remove(0);
        assert_eq!(obs.id, "42");
        assert_eq!(obs.date, ymd(2023, 2, 10));
    }

    #[test]
    fn test_import_local_midnight_dates() {
        // Exported at UTC+2: March 1st local midnight is Feb 28th 22:00 UTC.
        let document = r#"[
            {"species": "Red Fox", "location": "Park", "date": "2023-02-28T22:00:00.000Z"},
            {"species": "Raccoon", "location": "Park", "date": 1677621600000}
        ]"#;
        let imported = import(document, InvalidDatePolicy::Reject).unwrap();
        assert_eq!(imported[0].date, ymd(2023, 3, 1));
        assert_eq!(imported[1].date, ymd(2023, 3, 1));
    }

    #[test]
    fn test_import_invalid_date_rejects_batch() {
        let document = r#"[
            {"species": "Coyote", "location": "Park", "date": "2023-02-10"},
            {"species": "Raccoon", "location": "Park", "date": "last tuesday"}
        ]"#;
        let err = import(document, InvalidDatePolicy::Reject).unwrap_err();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("record 1"));
        assert!(err.to_string().contains("last tuesday"));
    }

    #[test]
    fn test_import_invalid_date_skip_policy() {
        let document = r#"[
            {"species": "Coyote", "location": "Park", "date": "2023-02-10"},
            {"species": "Raccoon", "location": "Park", "date": "last tuesday"},
            {"species": "Raccoon", "location": "Park"}
        ]"#;
        let imported = import(document, InvalidDatePolicy::Skip).unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].species, "Coyote");
    }

    #[test]
    fn test_import_reports_all_problems_together() {
        let document = r#"[
            42,
            {"location": "Park", "date": "2023-02-10"},
            {"species": "Raccoon", "location": "Park", "date": "2023-02-10"}
        ]"#;
        let err = import(document, InvalidDatePolicy::Skip).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("record 0: not an object"));
        assert!(msg.contains("record 1: missing species"));
        assert!(!msg.contains("record 2"));
    }

    #[test]
    fn test_raw_observation_normalize_missing_location() {
        let raw = RawObservation {
            species: Some(Value::String("Coyote".to_string())),
            date: Some(Value::String("2023-02-10".to_string())),
            ..RawObservation::default()
        };
        assert_eq!(raw.normalize(), Err(RecordIssue::MissingField("location")));
    }

    #[test]
    fn test_export_and_import_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_EXPORT_FILENAME);
        let list = sample_list();

        export_to_file(&list, &path).unwrap();
        let imported = import_from_file(&path, InvalidDatePolicy::Reject).unwrap();
        assert_eq!(imported, list);
    }

    #[test]
    fn test_import_from_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = import_from_file(dir.path().join("nope.json"), InvalidDatePolicy::Reject)
            .unwrap_err();
        assert!(err.is_io_error());
        assert!(!err.is_format_error());
    }

    #[test]
    fn test_invalid_date_policy_serde() {
        let policy: InvalidDatePolicy = serde_json::from_str("\"skip\"").unwrap();
        assert_eq!(policy, InvalidDatePolicy::Skip);
        assert_eq!(InvalidDatePolicy::default().to_string(), "reject");
    }
}
