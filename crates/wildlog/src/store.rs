//! The observation store.
//!
//! [`ObservationStore`] owns the canonical list of sightings and writes the
//! whole list back to its [`BlobSlot`] after every change.

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::observation::Observation;
use crate::sample::{self, DEFAULT_SAMPLE_YEAR};
use crate::storage::BlobSlot;
use crate::views::sort_newest_first;

/// Options controlling how a store is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Generate sample sightings when the slot is empty.
    pub seed_when_empty: bool,
    /// Year the sample sightings fall in.
    pub sample_year: i32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            seed_when_empty: true,
            sample_year: DEFAULT_SAMPLE_YEAR,
        }
    }
}

impl From<&Config> for StoreOptions {
    fn from(config: &Config) -> Self {
        Self {
            seed_when_empty: config.sample.seed_when_empty,
            sample_year: config.sample.year,
        }
    }
}

/// The canonical, persisted list of observations.
///
/// Observations are kept newest first after every add, update, merge and
/// undo. Deleting does not reorder. At most one deleted observation is held
/// for undo.
#[derive(Debug)]
pub struct ObservationStore<S: BlobSlot> {
    slot: S,
    undo_slot: Option<S>,
    observations: Vec<Observation>,
    last_deleted: Option<Observation>,
}

impl<S: BlobSlot> ObservationStore<S> {
    /// Load the store from `slot`, seeding it with sample data when the slot
    /// has never been written.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read or written, or if the
    /// persisted blob is not a valid observation list.
    pub fn load(slot: S, options: StoreOptions) -> Result<Self> {
        let observations = match slot.read()? {
            Some(blob) if !blob.trim().is_empty() => {
                let observations: Vec<Observation> =
                    serde_json::from_str(&blob).map_err(|e| {
                        warn!("Persisted observations are unreadable: {e}");
                        e
                    })?;
                info!("Loaded {} observations", observations.len());
                observations
            }
            _ if options.seed_when_empty => {
                let mut observations = sample::generate_sample_data(options.sample_year);
                sort_newest_first(&mut observations);
                slot.write(&serde_json::to_string(&observations)?)?;
                info!(
                    "Seeded empty logbook with {} sample observations",
                    observations.len()
                );
                observations
            }
            _ => {
                info!("Starting with an empty logbook");
                Vec::new()
            }
        };

        Ok(Self {
            slot,
            undo_slot: None,
            observations,
            last_deleted: None,
        })
    }

    /// Create a store over `observations` without touching the slot.
    #[must_use]
    pub fn from_observations(slot: S, observations: Vec<Observation>) -> Self {
        Self {
            slot,
            undo_slot: None,
            observations,
            last_deleted: None,
        }
    }

    /// Mirror the undo candidate into `slot`, restoring any candidate it holds.
    ///
    /// An unreadable mirror is discarded with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the mirror slot cannot be read.
    pub fn with_undo_slot(mut self, slot: S) -> Result<Self> {
        if let Some(blob) = slot.read()? {
            match serde_json::from_str::<Observation>(&blob) {
                Ok(candidate) => {
                    debug!("Restored undo candidate {}", candidate.id);
                    self.last_deleted = Some(candidate);
                }
                Err(e) => warn!("Discarding unreadable undo candidate: {e}"),
            }
        }
        self.undo_slot = Some(slot);
        Ok(self)
    }

    /// The current list, newest first.
    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Find an observation by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Observation> {
        self.observations.iter().find(|o| o.id == id)
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the store holds no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// The observation the next [`undo_last_delete`](Self::undo_last_delete) would restore.
    #[must_use]
    pub fn undo_candidate(&self) -> Option<&Observation> {
        self.last_deleted.as_ref()
    }

    /// Consume the store, returning the list.
    #[must_use]
    pub fn into_observations(self) -> Vec<Observation> {
        self.observations
    }

    /// Add a new observation. An observation whose id is already present is
    /// ignored and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be persisted.
    pub fn add(&mut self, observation: Observation) -> Result<&[Observation]> {
        if self.get(&observation.id).is_some() {
            debug!("Ignoring add of existing observation {}", observation.id);
            return Ok(&self.observations);
        }

        debug!("Adding observation {} ({})", observation.id, observation.species);
        let previous = self.observations.clone();
        self.observations.push(observation);
        sort_newest_first(&mut self.observations);
        self.commit(previous)?;
        Ok(&self.observations)
    }

    /// Replace the observation with the same id. Unknown ids are ignored and
    /// nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be persisted.
    pub fn update(&mut self, observation: Observation) -> Result<&[Observation]> {
        let Some(index) = self
            .observations
            .iter()
            .position(|o| o.id == observation.id)
        else {
            debug!("Ignoring update of unknown observation {}", observation.id);
            return Ok(&self.observations);
        };

        debug!("Updating observation {}", observation.id);
        let previous = self.observations.clone();
        self.observations[index] = observation;
        sort_newest_first(&mut self.observations);
        self.commit(previous)?;
        Ok(&self.observations)
    }

    /// Remove the observation with `id`, keeping it as the undo candidate.
    /// Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the list or the undo mirror cannot be persisted.
    pub fn delete(&mut self, id: &str) -> Result<&[Observation]> {
        let Some(index) = self.observations.iter().position(|o| o.id == id) else {
            debug!("Ignoring delete of unknown observation {id}");
            return Ok(&self.observations);
        };

        let previous = self.observations.clone();
        let removed = self.observations.remove(index);
        self.commit(previous)?;
        debug!("Deleted observation {} ({})", removed.id, removed.species);

        // The list is already on disk, so the candidate must be kept even if
        // the mirror write fails.
        let mirror = serde_json::to_string(&removed);
        self.last_deleted = Some(removed);
        if let Some(undo_slot) = &self.undo_slot {
            undo_slot.write(&mirror?)?;
        }
        Ok(&self.observations)
    }

    /// Restore the most recently deleted observation, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the list or the undo mirror cannot be persisted.
    pub fn undo_last_delete(&mut self) -> Result<&[Observation]> {
        let Some(candidate) = self.last_deleted.clone() else {
            debug!("Nothing to undo");
            return Ok(&self.observations);
        };

        debug!("Restoring observation {}", candidate.id);
        let previous = self.observations.clone();
        self.observations.push(candidate);
        sort_newest_first(&mut self.observations);
        self.commit(previous)?;
        self.last_deleted = None;
        if let Some(undo_slot) = &self.undo_slot {
            undo_slot.clear()?;
        }
        Ok(&self.observations)
    }

    /// Append a batch of observations. Ids are not deduplicated.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be persisted.
    pub fn merge(&mut self, observations: Vec<Observation>) -> Result<&[Observation]> {
        let added = observations.len();
        let previous = self.observations.clone();
        self.observations.extend(observations);
        sort_newest_first(&mut self.observations);
        self.commit(previous)?;
        info!(
            "Merged {added} observations ({} total)",
            self.observations.len()
        );
        Ok(&self.observations)
    }

    /// Persist the current list, putting `previous` back if the write fails
    /// so that memory never runs ahead of the slot.
    fn commit(&mut self, previous: Vec<Observation>) -> Result<()> {
        if let Err(err) = self.persist() {
            warn!("Failed to persist observations, keeping previous list: {err}");
            self.observations = previous;
            return Err(err);
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let blob = serde_json::to_string(&self.observations)?;
        self.slot.write(&blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, InvalidDatePolicy};
    use crate::storage::{MemorySlot, Storage};
    use crate::views::is_newest_first;
    use chrono::{Datelike, NaiveDate};
    use std::cell::Cell;
    use std::io;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn no_seed() -> StoreOptions {
        StoreOptions {
            seed_when_empty: false,
            sample_year: 2023,
        }
    }

    fn fox() -> Observation {
        Observation::new("Red Fox", "Discovery Park", ymd(2023, 3, 1))
    }

    fn raccoon() -> Observation {
        Observation::new("Raccoon", "Seward Park", ymd(2023, 1, 1))
    }

    fn heron() -> Observation {
        Observation::new("Great Blue Heron", "Green Lake", ymd(2023, 6, 15))
    }

    fn persisted(slot: &MemorySlot) -> Vec<Observation> {
        serde_json::from_str(&slot.contents().unwrap()).unwrap()
    }

    /// A slot whose writes can be switched to fail.
    #[derive(Debug, Default)]
    struct FlakySlot {
        inner: MemorySlot,
        failing: Cell<bool>,
    }

    impl FlakySlot {
        fn fail_writes(&self, failing: bool) {
            self.failing.set(failing);
        }
    }

    impl BlobSlot for FlakySlot {
        fn read(&self) -> Result<Option<String>> {
            self.inner.read()
        }

        fn write(&self, blob: &str) -> Result<()> {
            if self.failing.get() {
                return Err(crate::Error::file(
                    "wildlog.db",
                    io::Error::other("disk full"),
                ));
            }
            self.inner.write(blob)
        }

        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }
    }

    fn stored(slot: &FlakySlot) -> Vec<Observation> {
        serde_json::from_str(&slot.inner.contents().unwrap()).unwrap()
    }

    #[test]
    fn test_store_options_default() {
        let options = StoreOptions::default();
        assert!(options.seed_when_empty);
        assert_eq!(options.sample_year, 2023);
    }

    #[test]
    fn test_store_options_from_config() {
        let mut config = Config::default();
        config.sample.seed_when_empty = false;
        config.sample.year = 2020;

        let options = StoreOptions::from(&config);
        assert!(!options.seed_when_empty);
        assert_eq!(options.sample_year, 2020);
    }

    #[test]
    fn test_load_seeds_empty_slot() {
        let slot = MemorySlot::new();
        let store = ObservationStore::load(&slot, StoreOptions::default()).unwrap();

        assert_eq!(slot.writes(), 1);
        assert!(is_newest_first(store.observations()));
        assert!(store.observations().iter().all(|o| o.date.year() == 2023));
        assert_eq!(persisted(&slot).len(), store.len());
    }

    #[test]
    fn test_load_seeds_blank_slot() {
        let slot = MemorySlot::with_value("   ");
        let store = ObservationStore::load(
            &slot,
            StoreOptions {
                seed_when_empty: true,
                sample_year: 2021,
            },
        )
        .unwrap();

        assert_eq!(slot.writes(), 1);
        assert!(store.observations().iter().all(|o| o.date.year() == 2021));
    }

    #[test]
    fn test_load_without_seeding() {
        let slot = MemorySlot::new();
        let store = ObservationStore::load(&slot, no_seed()).unwrap();

        assert!(store.is_empty());
        assert_eq!(slot.writes(), 0);
        assert!(slot.contents().is_none());
    }

    #[test]
    fn test_load_existing_data() {
        let list = vec![fox(), raccoon()];
        let slot = MemorySlot::with_value(serde_json::to_string(&list).unwrap());
        let store = ObservationStore::load(&slot, StoreOptions::default()).unwrap();

        assert_eq!(store.observations(), list.as_slice());
        assert_eq!(slot.writes(), 0);
    }

    #[test]
    fn test_load_empty_array_is_not_reseeded() {
        let slot = MemorySlot::with_value("[]");
        let store = ObservationStore::load(&slot, StoreOptions::default()).unwrap();

        assert!(store.is_empty());
        assert_eq!(slot.writes(), 0);
    }

    #[test]
    fn test_load_unreadable_state_fails() {
        let slot = MemorySlot::with_value("{not json");
        let err = ObservationStore::load(&slot, StoreOptions::default()).unwrap_err();

        assert!(matches!(err, crate::Error::Json(_)));
        assert_eq!(slot.contents().as_deref(), Some("{not json"));
    }

    #[test]
    fn test_load_accepts_null_notes() {
        let slot = MemorySlot::with_value(
            r#"[{"id":"1","species":"Coyote","location":"Green Lake","date":"2023-02-14T00:00:00.000Z","notes":null,"timestamp":"2023-02-14T00:00:00.000Z"}]"#,
        );
        let store = ObservationStore::load(&slot, StoreOptions::default()).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.observations()[0].notes, "");
        assert_eq!(slot.writes(), 0);
    }

    #[test]
    fn test_add_sorts_newest_first_and_persists() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();

        store.add(raccoon()).unwrap();
        store.add(heron()).unwrap();
        let list = store.add(fox()).unwrap();

        let species: Vec<&str> = list.iter().map(|o| o.species.as_str()).collect();
        assert_eq!(species, vec!["Great Blue Heron", "Red Fox", "Raccoon"]);
        assert_eq!(slot.writes(), 3);
        assert_eq!(persisted(&slot), store.observations());
    }

    #[test]
    fn test_add_duplicate_id_is_noop() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        let observation = fox();

        store.add(observation.clone()).unwrap();
        let mut again = observation.clone();
        again.species = "Coyote".to_string();
        store.add(again).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.observations()[0].species, "Red Fox");
        assert_eq!(slot.writes(), 1);
    }

    #[test]
    fn test_update_replaces_and_resorts() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        let old = raccoon();
        store.add(old.clone()).unwrap();
        store.add(fox()).unwrap();

        let mut moved = old.clone();
        moved.date = ymd(2023, 12, 24);
        moved.notes = "Tracks in fresh snow leading to den.".to_string();
        let list = store.update(moved).unwrap();

        assert_eq!(list[0].id, old.id);
        assert_eq!(list[0].notes, "Tracks in fresh snow leading to den.");
        assert_eq!(list[0].timestamp, old.timestamp);
        assert_eq!(slot.writes(), 3);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        store.add(fox()).unwrap();

        let before = store.observations().to_vec();
        store.update(raccoon()).unwrap();

        assert_eq!(store.observations(), before.as_slice());
        assert_eq!(slot.writes(), 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        let target = fox();
        store.add(target.clone()).unwrap();
        store.add(raccoon()).unwrap();

        store.delete(&target.id).unwrap();
        let after_first = store.observations().to_vec();
        let writes = slot.writes();
        store.delete(&target.id).unwrap();

        assert_eq!(store.observations(), after_first.as_slice());
        assert_eq!(slot.writes(), writes);
        assert_eq!(store.undo_candidate(), Some(&target));
    }

    #[test]
    fn test_delete_does_not_reorder() {
        let list = vec![raccoon(), heron(), fox()];
        let slot = MemorySlot::new();
        let mut store = ObservationStore::from_observations(&slot, list.clone());

        store.delete(&list[1].id).unwrap();

        let ids: Vec<&str> = store.observations().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec![list[0].id.as_str(), list[2].id.as_str()]);
    }

    #[test]
    fn test_delete_then_undo_restores() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        store.add(fox()).unwrap();
        store.add(raccoon()).unwrap();
        store.add(heron()).unwrap();
        let original = store.observations().to_vec();

        store.delete(&original[1].id).unwrap();
        assert_eq!(store.len(), 2);

        let restored = store.undo_last_delete().unwrap();
        assert_eq!(restored, original.as_slice());
        assert!(store.undo_candidate().is_none());
        assert_eq!(persisted(&slot), original);
    }

    #[test]
    fn test_undo_depth_is_one() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        let a = fox();
        let b = raccoon();
        store.add(a.clone()).unwrap();
        store.add(b.clone()).unwrap();

        store.delete(&a.id).unwrap();
        store.delete(&b.id).unwrap();
        assert_eq!(store.undo_candidate(), Some(&b));

        store.undo_last_delete().unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.observations()[0].id, b.id);

        let writes = slot.writes();
        store.undo_last_delete().unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(slot.writes(), writes);
    }

    #[test]
    fn test_merge_keeps_duplicates() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        let existing = fox();
        store.add(existing.clone()).unwrap();

        let list = store.merge(vec![existing.clone(), raccoon()]).unwrap();

        assert_eq!(list.len(), 3);
        assert_eq!(list.iter().filter(|o| o.id == existing.id).count(), 2);
        assert!(is_newest_first(list));
        assert_eq!(slot.writes(), 2);
    }

    #[test]
    fn test_failed_import_leaves_store_unchanged() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        store.add(fox()).unwrap();
        let before = store.observations().to_vec();

        let result = codec::import(r#"{"not":"an array"}"#, InvalidDatePolicy::Reject)
            .and_then(|batch| store.merge(batch).map(<[Observation]>::to_vec));

        assert!(result.unwrap_err().is_format_error());
        assert_eq!(store.observations(), before.as_slice());
        assert_eq!(slot.writes(), 1);
    }

    #[test]
    fn test_export_import_merge_roundtrip() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        store.add(fox().with_notes("Hunting voles.")).unwrap();
        store.add(raccoon()).unwrap();

        let document = codec::export(store.observations()).unwrap();
        let imported = codec::import(&document, InvalidDatePolicy::Reject).unwrap();
        assert_eq!(imported, store.observations());

        let other = MemorySlot::new();
        let mut copy = ObservationStore::load(&other, no_seed()).unwrap();
        copy.merge(imported).unwrap();
        assert_eq!(copy.observations(), store.observations());
    }

    #[test]
    fn test_failed_write_keeps_memory_and_slot_in_step() {
        let slot = FlakySlot::default();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        store.add(fox()).unwrap();
        store.add(raccoon()).unwrap();
        let before = store.observations().to_vec();

        slot.fail_writes(true);

        let err = store.add(heron()).unwrap_err();
        assert!(err.is_io_error());
        assert_eq!(store.observations(), before.as_slice());

        let mut edited = before[0].clone();
        edited.date = ymd(2022, 1, 1);
        assert!(store.update(edited).is_err());
        assert_eq!(store.observations(), before.as_slice());

        assert!(store.delete(&before[0].id).is_err());
        assert_eq!(store.observations(), before.as_slice());
        assert!(store.undo_candidate().is_none());

        assert!(store.merge(vec![heron()]).is_err());
        assert_eq!(store.observations(), before.as_slice());

        assert_eq!(stored(&slot), before);
    }

    #[test]
    fn test_failed_undo_keeps_candidate() {
        let slot = FlakySlot::default();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        let target = fox();
        store.add(target.clone()).unwrap();
        store.add(raccoon()).unwrap();
        store.delete(&target.id).unwrap();
        let before = store.observations().to_vec();

        slot.fail_writes(true);
        assert!(store.undo_last_delete().is_err());
        assert_eq!(store.observations(), before.as_slice());
        assert_eq!(store.undo_candidate(), Some(&target));

        slot.fail_writes(false);
        store.undo_last_delete().unwrap();
        assert!(store.get(&target.id).is_some());
        assert_eq!(stored(&slot), store.observations());
    }

    #[test]
    fn test_failed_mirror_write_keeps_candidate() {
        let slot = FlakySlot::default();
        let undo = FlakySlot::default();
        let mut store = ObservationStore::load(&slot, no_seed())
            .unwrap()
            .with_undo_slot(&undo)
            .unwrap();
        let target = fox();
        store.add(target.clone()).unwrap();

        undo.fail_writes(true);
        assert!(store.delete(&target.id).is_err());
        assert!(store.is_empty());
        assert!(stored(&slot).is_empty());
        assert_eq!(store.undo_candidate(), Some(&target));
    }

    #[test]
    fn test_undo_mirror_survives_reload() {
        let slot = MemorySlot::new();
        let undo = MemorySlot::new();
        let target = fox();

        {
            let mut store = ObservationStore::load(&slot, no_seed())
                .unwrap()
                .with_undo_slot(&undo)
                .unwrap();
            store.add(target.clone()).unwrap();
            store.add(raccoon()).unwrap();
            store.delete(&target.id).unwrap();
        }
        assert!(undo.contents().is_some());

        let mut store = ObservationStore::load(&slot, no_seed())
            .unwrap()
            .with_undo_slot(&undo)
            .unwrap();
        assert_eq!(store.undo_candidate(), Some(&target));

        store.undo_last_delete().unwrap();
        assert!(store.get(&target.id).is_some());
        assert!(undo.contents().is_none());
    }

    #[test]
    fn test_unreadable_undo_mirror_is_discarded() {
        let slot = MemorySlot::new();
        let undo = MemorySlot::with_value("garbage");
        let store = ObservationStore::load(&slot, no_seed())
            .unwrap()
            .with_undo_slot(&undo)
            .unwrap();

        assert!(store.undo_candidate().is_none());
    }

    #[test]
    fn test_sqlite_backed_store_reloads() {
        let storage = Storage::open_in_memory().unwrap();
        let target = heron();

        {
            let mut store = ObservationStore::load(storage.slot("log"), no_seed()).unwrap();
            store.add(target.clone()).unwrap();
            store.add(fox()).unwrap();
        }

        let store = ObservationStore::load(storage.slot("log"), no_seed()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.observations()[0], target);
    }

    #[test]
    fn test_get_and_into_observations() {
        let slot = MemorySlot::new();
        let mut store = ObservationStore::load(&slot, no_seed()).unwrap();
        let target = fox();
        store.add(target.clone()).unwrap();

        assert_eq!(store.get(&target.id), Some(&target));
        assert!(store.get("missing").is_none());
        assert_eq!(store.into_observations(), vec![target]);
    }
}
