//! Configuration management for wildlog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::codec::{InvalidDatePolicy, DEFAULT_EXPORT_FILENAME};
use crate::error::{Error, Result};
use crate::sample::DEFAULT_SAMPLE_YEAR;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "wildlog";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "observations.db";

/// Default slot holding the observation log.
pub const DEFAULT_SLOT_KEY: &str = "wildlifeObservations";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `WILDLOG_`)
/// 2. TOML config file at `~/.config/wildlog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Import configuration.
    pub import: ImportConfig,
    /// Export configuration.
    pub export: ExportConfig,
    /// Sample data configuration.
    pub sample: SampleConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/wildlog/observations.db`
    pub database_path: Option<PathBuf>,
    /// Name of the slot holding the observation log.
    pub slot_key: String,
    /// Keep the undo candidate in its own slot so `undo` works across runs.
    pub persist_undo: bool,
}

/// Import-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// What to do with records whose date cannot be parsed.
    pub invalid_dates: InvalidDatePolicy,
}

/// Export-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// File name used when `export` is given no path.
    pub default_filename: String,
}

/// Sample data configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    /// Seed a fresh logbook with generated sightings.
    pub seed_when_empty: bool,
    /// Year the generated sightings fall in.
    pub year: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            slot_key: DEFAULT_SLOT_KEY.to_string(),
            persist_undo: true,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_filename: DEFAULT_EXPORT_FILENAME.to_string(),
        }
    }
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            seed_when_empty: true,
            year: DEFAULT_SAMPLE_YEAR,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("WILDLOG_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.slot_key.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "slot_key must not be empty".to_string(),
            });
        }

        if !(1900..=9999).contains(&self.sample.year) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "sample year ({}) must be between 1900 and 9999",
                    self.sample.year
                ),
            });
        }

        if !self
            .export
            .default_filename
            .to_ascii_lowercase()
            .ends_with(".json")
        {
            return Err(Error::ConfigValidation {
                message: format!(
                    "default_filename ({}) must end in .json",
                    self.export.default_filename
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Key of the slot mirroring the undo candidate.
    #[must_use]
    pub fn undo_slot_key(&self) -> String {
        format!("{}.lastDeleted", self.storage.slot_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.storage.slot_key, "wildlifeObservations");
        assert!(config.storage.persist_undo);
        assert_eq!(config.import.invalid_dates, InvalidDatePolicy::Reject);
        assert_eq!(config.export.default_filename, "wildlife-observations.json");
        assert!(config.sample.seed_when_empty);
        assert_eq!(config.sample.year, 2023);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_slot_key() {
        let mut config = Config::default();
        config.storage.slot_key = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("slot_key"));
    }

    #[test]
    fn test_validate_sample_year() {
        let mut config = Config::default();
        config.sample.year = 12;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sample year"));
    }

    #[test]
    fn test_validate_export_filename() {
        let mut config = Config::default();
        config.export.default_filename = "observations.csv".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("default_filename"));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config
            .database_path()
            .to_string_lossy()
            .contains("observations.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/log.db"));

        assert_eq!(config.database_path(), PathBuf::from("/custom/path/log.db"));
    }

    #[test]
    fn test_undo_slot_key() {
        let config = Config::default();
        assert_eq!(config.undo_slot_key(), "wildlifeObservations.lastDeleted");
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("wildlog"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_default_data_dir() {
        assert!(Config::default_data_dir()
            .to_string_lossy()
            .contains("wildlog"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.storage, StorageConfig::default());
        assert_eq!(config.sample, SampleConfig::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[storage]
slot_key = "fieldNotes"
persist_undo = false

[import]
invalid_dates = "skip"

[sample]
seed_when_empty = false
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.storage.slot_key, "fieldNotes");
        assert!(!config.storage.persist_undo);
        assert_eq!(config.import.invalid_dates, InvalidDatePolicy::Skip);
        assert!(!config.sample.seed_when_empty);
        assert_eq!(config.sample.year, 2023);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sample]\nyear = 3\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_storage_config_deserialize() {
        let json = r#"{"slot_key": "other"}"#;
        let storage: StorageConfig = serde_json::from_str(json).unwrap();
        assert_eq!(storage.slot_key, "other");
        assert!(storage.persist_undo);
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("slot_key"));
        assert!(json.contains("invalid_dates"));
        assert!(json.contains("seed_when_empty"));
    }
}
