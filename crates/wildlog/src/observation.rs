//! Core observation types for wildlog.
//!
//! This module defines the observation record, the draft a user fills in
//! before an observation exists, and the date format used on the wire.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Field, Result, ValidationError};

/// Minimum number of characters in a species name.
pub const MIN_SPECIES_LEN: usize = 2;

/// Minimum number of characters in a location.
pub const MIN_LOCATION_LEN: usize = 3;

/// A single recorded wildlife sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Opaque unique identifier, immutable once created.
    pub id: String,

    /// Species name. Free text; new species are created ad hoc.
    pub species: String,

    /// Place name or a "lat, lon" pair.
    pub location: String,

    /// The day the animal was seen.
    #[serde(with = "calendar_date")]
    pub date: NaiveDate,

    /// Free-form notes, empty when none were given.
    #[serde(default, deserialize_with = "string_or_empty")]
    pub notes: String,

    /// Image payload as a data URI.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty_string"
    )]
    pub photo: Option<String>,

    /// When the record was created (RFC 3339). Preserved across edits.
    pub timestamp: String,
}

impl Observation {
    /// Create a new observation with a fresh id and creation timestamp.
    ///
    /// No validation happens here; use [`ObservationDraft`] for user input.
    #[must_use]
    pub fn new(
        species: impl Into<String>,
        location: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: new_id(),
            species: species.into(),
            location: location.into(),
            date,
            notes: String::new(),
            photo: None,
            timestamp: now_timestamp(),
        }
    }

    /// Set the notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Set the photo payload. An empty payload clears it.
    #[must_use]
    pub fn with_photo(mut self, photo: impl Into<String>) -> Self {
        let photo = photo.into();
        self.photo = if photo.is_empty() { None } else { Some(photo) };
        self
    }

    /// Check if this observation carries a photo.
    #[must_use]
    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }

    /// Extract a trailing latitude/longitude pair from the location.
    ///
    /// Accepts both "47.6612, -122.4060" and "Discovery Park, 47.6612, -122.4060".
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        parse_coordinates(&self.location)
    }
}

/// Generate a fresh observation id.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// The current instant formatted as an observation timestamp.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The midnight UTC instant of a calendar date, as written to disk.
#[must_use]
pub fn date_to_timestamp(date: NaiveDate) -> String {
    date.and_time(NaiveTime::default())
        .and_utc()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a date as written by [`date_to_timestamp`] or as a bare `YYYY-MM-DD`.
///
/// An instant with an explicit offset yields its calendar date in that offset.
/// A UTC instant goes through [`instant_to_date`].
#[must_use]
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        if instant.offset().local_minus_utc() != 0 {
            return Some(instant.date_naive());
        }
        return instant_to_date(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// The calendar date a UTC instant stands for.
///
/// Dates written by other tools are often local midnight converted to UTC, so
/// "2023-02-28T22:00:00Z" (midnight at UTC+2) means March 1st. The instant is
/// rounded to the nearest UTC midnight, which recovers the date for writers
/// between UTC-11 and UTC+12.
#[must_use]
pub fn instant_to_date(instant: DateTime<Utc>) -> Option<NaiveDate> {
    instant
        .checked_add_signed(TimeDelta::hours(12))
        .map(|shifted| shifted.date_naive())
}

/// Parse a trailing "lat, lon" pair out of free-text location.
#[must_use]
pub fn parse_coordinates(location: &str) -> Option<(f64, f64)> {
    static COORDS: OnceLock<Regex> = OnceLock::new();
    let regex = COORDS.get_or_init(|| {
        Regex::new(r"(-?\d{1,3}(?:\.\d+)?)\s*,\s*(-?\d{1,3}(?:\.\d+)?)\s*$")
            .expect("coordinate pattern is valid")
    });

    let caps = regex.captures(location)?;
    let lat: f64 = caps[1].parse().ok()?;
    let lon: f64 = caps[2].parse().ok()?;
    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
        Some((lat, lon))
    } else {
        None
    }
}

/// Check that a photo payload is an inline image data URI.
#[must_use]
pub fn is_image_data_uri(payload: &str) -> bool {
    static DATA_URI: OnceLock<Regex> = OnceLock::new();
    DATA_URI
        .get_or_init(|| {
            Regex::new(r"^data:image/[A-Za-z0-9.+-]+(;[A-Za-z0-9=.-]+)*;base64,[A-Za-z0-9+/=\r\n]*$")
                .expect("data URI pattern is valid")
        })
        .is_match(payload)
}

/// User input for creating or editing an observation.
///
/// Holds the form fields before they are checked. Converting a draft into an
/// [`Observation`] applies the field rules and returns the first violation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationDraft {
    /// Species name.
    pub species: String,
    /// Location text.
    pub location: String,
    /// Observation date; required.
    pub date: Option<NaiveDate>,
    /// Optional notes.
    pub notes: Option<String>,
    /// Optional image data URI.
    pub photo: Option<String>,
}

impl ObservationDraft {
    /// Prefill a draft from an existing observation, for editing.
    #[must_use]
    pub fn from_observation(observation: &Observation) -> Self {
        Self {
            species: observation.species.clone(),
            location: observation.location.clone(),
            date: Some(observation.date),
            notes: Some(observation.notes.clone()),
            photo: observation.photo.clone(),
        }
    }

    /// Every field rule this draft violates, in form order.
    #[must_use]
    pub fn errors(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.species.trim().chars().count() < MIN_SPECIES_LEN {
            errors.push(ValidationError::new(
                Field::Species,
                "Species must be at least 2 characters.",
            ));
        }
        if self.location.trim().chars().count() < MIN_LOCATION_LEN {
            errors.push(ValidationError::new(
                Field::Location,
                "Location is required.",
            ));
        }
        if self.date.is_none() {
            errors.push(ValidationError::new(Field::Date, "Please select a date."));
        }
        if let Some(photo) = self.photo.as_deref() {
            if !photo.is_empty() && !is_image_data_uri(photo) {
                errors.push(ValidationError::new(
                    Field::Photo,
                    "Photo must be an image data URI.",
                ));
            }
        }

        errors
    }

    /// Check the draft against the field rules.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        match self.errors().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Turn the draft into a brand new observation.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any field rule is violated.
    pub fn into_observation(self) -> Result<Observation> {
        self.build(new_id(), now_timestamp())
    }

    /// Produce the replacement for `existing`, keeping its id and timestamp.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any field rule is violated.
    pub fn apply_to(self, existing: &Observation) -> Result<Observation> {
        self.build(existing.id.clone(), existing.timestamp.clone())
    }

    fn build(self, id: String, timestamp: String) -> Result<Observation> {
        self.validate()?;
        let date = self
            .date
            .ok_or_else(|| ValidationError::new(Field::Date, "Please select a date."))?;

        Ok(Observation {
            id,
            species: self.species.trim().to_string(),
            location: self.location.trim().to_string(),
            date,
            notes: self.notes.unwrap_or_default(),
            photo: self.photo.filter(|p| !p.is_empty()),
            timestamp,
        })
    }
}

fn string_or_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Serde adapter writing a calendar date as its midnight UTC instant.
pub mod calendar_date {
    use super::{date_to_timestamp, parse_date, Deserialize, Deserializer, NaiveDate, Serializer};

    /// Serialize a date as an RFC 3339 instant.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date_to_timestamp(*date))
    }

    /// Deserialize a date from an RFC 3339 instant or `YYYY-MM-DD`.
    ///
    /// # Errors
    ///
    /// Fails if the string is not a recognizable date.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {raw}")))
    }
}
