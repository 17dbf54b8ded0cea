//! # SQLite Schema for wordtally
//!
//! This module defines the counter table and handles database bootstrap.
//!
//! ## Table Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  words                          wordtally_metadata        │
//! │  ┌──────────────────────┐       ┌──────────────────┐      │
//! │  │ id (PK, autoinc)     │       │ key (PK)         │      │
//! │  │ word (UNIQUE)        │       │ value            │      │
//! │  │ count (>= 0)         │       └──────────────────┘      │
//! │  │ created_ms           │                                 │
//! │  │ updated_ms           │                                 │
//! │  └──────────────────────┘                                 │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The UNIQUE constraint on `word` is the storage-level backstop for the
//! one-row-per-word invariant: if two writers ever tried to create the same
//! word, the second insert fails and its batch rolls back.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::{Error, Result};

// =============================================================================
// Schema Version
// =============================================================================

/// Current schema version. Increment when making breaking schema changes.
///
/// There are no migrations: a mismatching database is rejected.
const SCHEMA_VERSION: i32 = 1;

/// How long a connection waits on SQLite's file lock before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// DDL Statements
// =============================================================================

/// The `words` table: one cumulative counter per normalized word.
///
/// # Columns
///
/// - `id`: Surrogate identity, never reused (AUTOINCREMENT)
/// - `word`: Normalized lower-case word, unique
/// - `count`: Cumulative occurrences, never negative
/// - `created_ms` / `updated_ms`: Bookkeeping only
const CREATE_WORDS: &str = r#"
CREATE TABLE IF NOT EXISTS words (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    word        TEXT    NOT NULL UNIQUE,
    count       INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
    created_ms  INTEGER NOT NULL,
    updated_ms  INTEGER NOT NULL
)
"#;

/// Index backing the ranking query (`ORDER BY count DESC, id`).
const CREATE_WORDS_COUNT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS words_count
ON words(count DESC, id)
"#;

/// Metadata table for schema versioning.
const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS wordtally_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

// =============================================================================
// Database Wrapper
// =============================================================================

/// A SQLite connection with the wordtally schema applied.
///
/// # Ownership
///
/// `Database` owns its `Connection`. Use [`Database::into_connection`] to hand
/// the connection to the writer thread once bootstrap is done.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database file, creating it (and missing parent directories)
    /// if necessary.
    ///
    /// # Errors
    ///
    /// - `Error::Io` if the parent directory can't be created
    /// - `Error::Sqlite` if the file can't be opened or created
    /// - `Error::Schema` if the schema version doesn't match
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use wordtally::Database;
    ///
    /// let db = Database::open("data/words.db")?;
    /// # Ok::<(), wordtally::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!(dir = %parent.display(), "created database directory");
            }
        }

        let conn = Connection::open(path)?;
        let mut db = Self { conn };
        db.initialize(true)?;
        Ok(db)
    }

    /// Creates an in-memory database for testing.
    ///
    /// In-memory databases can't be shared with reader connections, so they
    /// are only useful for exercising storage functions directly.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.initialize(false)?;
        Ok(db)
    }

    /// Applies pragmas, creates tables, and checks the schema version.
    fn initialize(&mut self, wal: bool) -> Result<()> {
        // WAL lets reader connections see committed data while the writer
        // holds its transaction open.
        if wal {
            self.conn.execute_batch("PRAGMA journal_mode = WAL")?;
        }
        self.conn.execute_batch("PRAGMA synchronous = NORMAL")?;
        self.conn.busy_timeout(BUSY_TIMEOUT)?;

        self.conn.execute_batch(CREATE_METADATA)?;
        self.conn.execute_batch(CREATE_WORDS)?;
        self.conn.execute_batch(CREATE_WORDS_COUNT_INDEX)?;

        self.verify_or_set_version()
    }

    /// Verifies the schema version, or sets it if this is a new database.
    fn verify_or_set_version(&mut self) -> Result<()> {
        let existing: Option<String> = match self.conn.query_row(
            "SELECT value FROM wordtally_metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        ) {
            Ok(v) => Some(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO wordtally_metadata (key, value) VALUES ('schema_version', ?)",
                    [SCHEMA_VERSION.to_string()],
                )?;
            }
            Some(v) if v == SCHEMA_VERSION.to_string() => {}
            Some(v) => {
                return Err(Error::Schema(format!(
                    "schema version mismatch: database has version {v}, but this build requires {SCHEMA_VERSION}"
                )));
            }
        }

        Ok(())
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the wrapper, returning the connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

// =============================================================================
// Tests
// =============================================================================
