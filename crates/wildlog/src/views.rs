//! Derived views over the observation log.
//!
//! Everything here is a pure function of a list snapshot: filtering, table
//! sorting, the seasonal chart aggregation and the species index. None of
//! these projections are stored or mutated in place.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::observation::Observation;

/// Abbreviated month names, January first.
pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Column a table view can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Species name.
    Species,
    /// Location text.
    Location,
    /// Observation date.
    #[default]
    Date,
    /// Notes text.
    Notes,
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Species => write!(f, "species"),
            Self::Location => write!(f, "location"),
            Self::Date => write!(f, "date"),
            Self::Notes => write!(f, "notes"),
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "species" => Ok(Self::Species),
            "location" => Ok(Self::Location),
            "date" => Ok(Self::Date),
            "notes" => Ok(Self::Notes),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    #[default]
    Descending,
}

impl SortDirection {
    /// The opposite direction, as when a table header is clicked twice.
    #[must_use]
    pub fn toggle(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(format!("unknown sort direction: {other}")),
        }
    }
}

/// Order in which [`distinct_species`] reports names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeciesOrder {
    /// In the order each species first appears in the list.
    #[default]
    FirstSeen,
    /// Alphabetically, for selection widgets.
    Sorted,
}

/// Compare two strings the way a human-facing table would.
///
/// Three levels, as a collator does: base letters with accents and case
/// folded away, then accents (unaccented first), then case (lowercase
/// first). The ordering is total and deterministic.
#[must_use]
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    base_letters(a)
        .cmp(base_letters(b))
        .then_with(|| accented_letters(a).cmp(accented_letters(b)))
        .then_with(|| b.cmp(a))
}

fn base_letters(s: &str) -> impl Iterator<Item = char> + '_ {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
}

fn accented_letters(s: &str) -> impl Iterator<Item = char> + '_ {
    s.nfd().flat_map(char::to_lowercase)
}

/// Observations matching a species filter and a free-text query.
///
/// The species filter is an exact match, or passes everything when `None`.
/// The query is a case-insensitive substring match against species, location
/// and notes; an empty query matches everything. Both conditions must hold.
pub fn filter_by<'a, I>(items: I, species: Option<&str>, query: &str) -> Vec<&'a Observation>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let query = query.to_lowercase();
    items
        .into_iter()
        .filter(|obs| species.map_or(true, |s| obs.species == s))
        .filter(|obs| query.is_empty() || matches_query(obs, &query))
        .collect()
}

fn matches_query(obs: &Observation, lowered_query: &str) -> bool {
    [&obs.species, &obs.location, &obs.notes]
        .iter()
        .any(|field| field.to_lowercase().contains(lowered_query))
}

/// Observations sorted by one field.
///
/// Equal elements keep their relative input order.
pub fn sort_by<'a, I>(items: I, field: SortField, direction: SortDirection) -> Vec<&'a Observation>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut sorted: Vec<&Observation> = items.into_iter().collect();
    sorted.sort_by(|a, b| {
        let ordering = compare_field(a, b, field);
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
    sorted
}

fn compare_field(a: &Observation, b: &Observation, field: SortField) -> Ordering {
    match field {
        SortField::Species => locale_cmp(&a.species, &b.species),
        SortField::Location => locale_cmp(&a.location, &b.location),
        SortField::Date => a.date.cmp(&b.date),
        SortField::Notes => locale_cmp(&a.notes, &b.notes),
    }
}

/// Sort observations in place, newest date first.
///
/// This is the canonical order of the log.
pub fn sort_newest_first(observations: &mut [Observation]) {
    observations.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Check that observations are ordered newest date first.
#[must_use]
pub fn is_newest_first(observations: &[Observation]) -> bool {
    observations.windows(2).all(|pair| pair[0].date >= pair[1].date)
}

/// Distinct species names, case-sensitive.
pub fn distinct_species<'a, I>(items: I, order: SpeciesOrder) -> Vec<String>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    let mut species = Vec::new();
    for obs in items {
        if seen.insert(obs.species.as_str()) {
            species.push(obs.species.clone());
        }
    }

    if order == SpeciesOrder::Sorted {
        species.sort_by(|a, b| locale_cmp(a, b));
    }
    species
}

/// Observations that carry a photo, for the gallery.
pub fn with_photos<'a, I>(items: I) -> Vec<&'a Observation>
where
    I: IntoIterator<Item = &'a Observation>,
{
    items.into_iter().filter(|obs| obs.has_photo()).collect()
}

/// Sightings in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    /// Abbreviated month name ("Jan" ... "Dec").
    pub name: &'static str,
    /// Count per species; every species in the dataset is present.
    pub counts: BTreeMap<String, usize>,
    /// All sightings in the month.
    pub total: usize,
}

impl MonthBucket {
    /// Sightings of `species` in this month; zero for unknown species.
    #[must_use]
    pub fn count(&self, species: &str) -> usize {
        self.counts.get(species).copied().unwrap_or(0)
    }
}

/// Per-month sighting counts driving the seasonal chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyAggregate {
    /// The species axis, in first-seen order.
    pub species: Vec<String>,
    /// Twelve buckets, January first.
    pub months: Vec<MonthBucket>,
}

impl MonthlyAggregate {
    /// Look up a bucket by its abbreviated month name.
    #[must_use]
    pub fn month(&self, name: &str) -> Option<&MonthBucket> {
        self.months.iter().find(|bucket| bucket.name == name)
    }

    /// The twelve monthly counts for one species (a trend line).
    #[must_use]
    pub fn series(&self, species: &str) -> Vec<usize> {
        self.months.iter().map(|bucket| bucket.count(species)).collect()
    }

    /// The twelve monthly totals (the aggregate line).
    #[must_use]
    pub fn totals(&self) -> Vec<usize> {
        self.months.iter().map(|bucket| bucket.total).collect()
    }

    /// Sightings across all months.
    #[must_use]
    pub fn grand_total(&self) -> usize {
        self.months.iter().map(|bucket| bucket.total).sum()
    }
}

/// Bucket observations by calendar month of their date.
///
/// Every month is present. Each bucket maps every species found anywhere in
/// the list to its count for that month, zero included.
pub fn monthly_aggregate<'a, I>(items: I) -> MonthlyAggregate
where
    I: IntoIterator<Item = &'a Observation>,
    I::IntoIter: Clone,
{
    let items = items.into_iter();
    let species = distinct_species(items.clone(), SpeciesOrder::FirstSeen);

    let zeroed: BTreeMap<String, usize> = species.iter().map(|s| (s.clone(), 0)).collect();
    let mut months: Vec<MonthBucket> = MONTH_NAMES
        .iter()
        .map(|&name| MonthBucket {
            name,
            counts: zeroed.clone(),
            total: 0,
        })
        .collect();

    for obs in items {
        let bucket = &mut months[obs.date.month0() as usize];
        *bucket.counts.entry(obs.species.clone()).or_insert(0) += 1;
        bucket.total += 1;
    }

    MonthlyAggregate { species, months }
}

/// A filter plus an optional sort, as applied by a list or table view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Exact species to keep.
    pub species: Option<String>,
    /// Free-text query.
    pub text: String,
    /// Sort field and direction; `None` keeps the input order.
    pub sort: Option<(SortField, SortDirection)>,
    /// Keep only observations with photos.
    pub photos_only: bool,
}

impl ListQuery {
    /// Apply the query to a list snapshot.
    #[must_use]
    pub fn apply<'a>(&self, observations: &'a [Observation]) -> Vec<&'a Observation> {
        let base: Vec<&Observation> = if self.photos_only {
            with_photos(observations)
        } else {
            observations.iter().collect()
        };
        let filtered = filter_by(base, self.species.as_deref(), &self.text);
        match self.sort {
            Some((field, direction)) => sort_by(filtered, field, direction),
            None => filtered,
        }
    }
}
