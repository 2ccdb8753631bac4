//! `wildlog` - A local logbook of wildlife sightings
//!
//! This library holds the logbook core: the observation model and its
//! validation, the persisted observation store with single-step undo, pure
//! derived views (filter, sort, monthly aggregate), the JSON import/export
//! codec and a sample data generator for fresh logbooks.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod observation;
pub mod sample;
pub mod storage;
pub mod store;
pub mod views;

pub use codec::InvalidDatePolicy;
pub use config::Config;
pub use error::{Error, Field, Result, ValidationError};
pub use logging::init_logging;
pub use observation::{Observation, ObservationDraft};
pub use storage::{BlobSlot, MemorySlot, Storage, StorageStats};
pub use store::{ObservationStore, StoreOptions};
pub use views::{ListQuery, MonthlyAggregate, SortDirection, SortField, SpeciesOrder};
