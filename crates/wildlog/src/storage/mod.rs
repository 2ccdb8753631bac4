//! Storage layer for wildlog.
//!
//! The observation log is persisted as one serialized blob per named slot.
//! [`BlobSlot`] is the seam the store writes through; [`Storage`] provides
//! `SQLite`-backed slots and [`MemorySlot`] an in-process one.

pub mod schema;

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

use self::schema::SCHEMA_STATEMENTS;

/// Schema version written by this build.
pub const SCHEMA_VERSION: i32 = 1;

/// Metadata key holding the schema version.
const VERSION_KEY: &str = "schema_version";

/// A durable location holding a single serialized blob.
pub trait BlobSlot {
    /// Read the blob, or `None` if nothing has been written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn read(&self) -> Result<Option<String>>;

    /// Replace the blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn write(&self, blob: &str) -> Result<()>;

    /// Remove the blob so that the next read returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn clear(&self) -> Result<()>;
}

/// `SQLite`-backed key-value storage for slots.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A handle to the slot stored under `key`.
    #[must_use]
    pub fn slot(&self, key: impl Into<String>) -> SqliteSlot<'_> {
        SqliteSlot {
            storage: self,
            key: key.into(),
        }
    }

    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM slots WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.conn.execute(
            r"
            INSERT INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value, updated_at],
        )?;
        debug!("Wrote {} bytes to slot {}", value.len(), key);
        Ok(())
    }

    /// Remove the value stored under `key`.
    ///
    /// Returns `true` if a value was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM slots WHERE key = ?1", [key])?;
        Ok(affected > 0)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (slot_count, stored_bytes): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(value)), 0) FROM slots",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let last_write: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM slots ORDER BY updated_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let last_write = last_write
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            slot_count,
            stored_bytes,
            last_write,
            db_size_bytes,
        })
    }
}

/// Create the tables and record the schema version.
///
/// A database stamped by a newer build is refused rather than written to.
fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    let Some(stored) = stored else {
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)",
            (VERSION_KEY, SCHEMA_VERSION.to_string()),
        )?;
        debug!("Stamped new database with schema version {SCHEMA_VERSION}");
        return Ok(());
    };

    match stored.parse::<i32>() {
        Ok(version) if version <= SCHEMA_VERSION => Ok(()),
        Ok(version) => Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
            ),
        }),
        Err(_) => Err(Error::DatabaseMigration {
            message: format!("invalid schema version: {stored}"),
        }),
    }
}

/// A named slot inside a [`Storage`] database.
#[derive(Debug)]
pub struct SqliteSlot<'a> {
    storage: &'a Storage,
    key: String,
}

impl SqliteSlot<'_> {
    /// The key this slot is stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl BlobSlot for SqliteSlot<'_> {
    fn read(&self) -> Result<Option<String>> {
        self.storage.get(&self.key)
    }

    fn write(&self, blob: &str) -> Result<()> {
        self.storage.put(&self.key, blob)
    }

    fn clear(&self) -> Result<()> {
        self.storage.remove(&self.key).map(|_| ())
    }
}

/// A slot that lives in process memory.
///
/// Counts writes so callers can check what was persisted and when.
#[derive(Debug, Default)]
pub struct MemorySlot {
    value: RefCell<Option<String>>,
    writes: Cell<usize>,
}

impl MemorySlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot that already holds `blob`.
    #[must_use]
    pub fn with_value(blob: impl Into<String>) -> Self {
        Self {
            value: RefCell::new(Some(blob.into())),
            writes: Cell::new(0),
        }
    }

    /// Number of writes and clears performed so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    /// Current contents, without counting as a read.
    #[must_use]
    pub fn contents(&self) -> Option<String> {
        self.value.borrow().clone()
    }
}

impl BlobSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.value.borrow().clone())
    }

    fn write(&self, blob: &str) -> Result<()> {
        *self.value.borrow_mut() = Some(blob.to_string());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.value.borrow_mut() = None;
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

impl<T: BlobSlot + ?Sized> BlobSlot for &T {
    fn read(&self) -> Result<Option<String>> {
        (**self).read()
    }

    fn write(&self, blob: &str) -> Result<()> {
        (**self).write(blob)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of slots holding a value.
    pub slot_count: i64,
    /// Total size of all stored values in bytes.
    pub stored_bytes: i64,
    /// When any slot was last written.
    pub last_write: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
