//! Error types for wildlog.
//!
//! This module defines all error types used throughout the wildlog crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The observation field a validation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// The species name.
    Species,
    /// The location text.
    Location,
    /// The observation date.
    Date,
    /// The photo payload.
    Photo,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Species => write!(f, "species"),
            Self::Location => write!(f, "location"),
            Self::Date => write!(f, "date"),
            Self::Photo => write!(f, "photo"),
        }
    }
}

/// A form-level constraint violation on a single field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// The offending field.
    pub field: Field,
    /// Message suitable for showing next to the field.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for the given field.
    #[must_use]
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// The main error type for wildlog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Observation Errors ===
    /// A draft observation failed validation.
    #[error("invalid observation: {0}")]
    Validation(#[from] ValidationError),

    /// An import document has the wrong shape or unparseable content.
    #[error("invalid import document: {message}")]
    Format {
        /// Description of what is wrong with the document.
        message: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// The database schema version is unusable.
    #[error("database schema error: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// Failed to read or write a specific file.
    #[error("failed to access {path}: {source}")]
    File {
        /// Path of the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for wildlog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new format error.
    #[must_use]
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create a file access error for the given path.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Check if this error is a form-level validation failure.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this error is an import format failure.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Format { .. })
    }

    /// Check if this error came from reading or writing a file.
    #[must_use]
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            Self::File { .. } | Self::DirectoryCreate { .. }
        )
    }
}
