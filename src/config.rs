//! # Service Configuration
//!
//! `TallyConfig` is read from a JSON file (by default
//! `config/dbConfig.json`). Every field is optional:
//!
//! ```json
//! {
//!   "database_path": "data/words.db",
//!   "reader_threads": 4,
//!   "lock_timeout_ms": 5000,
//!   "batch_timeout_ms": 10,
//!   "batch_max_size": 1000,
//!   "top_words_limit": 10
//! }
//! ```

use std::path::{Path, PathBuf};
use std::thread::available_parallelism;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{EngineConfig, DEFAULT_LOCK_TIMEOUT};
use crate::error::{Error, Result};
use crate::writer::{WriterConfig, DEFAULT_BATCH_MAX_SIZE, DEFAULT_BATCH_TIMEOUT_MS};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/dbConfig.json";

/// Default database file.
pub const DEFAULT_DATABASE_PATH: &str = "data/words.db";

/// Default number of entries returned by the ranking query.
pub const DEFAULT_TOP_WORDS_LIMIT: usize = 10;

const MIN_READER_THREADS: usize = 1;
const MAX_READER_THREADS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TallyConfig {
    /// SQLite database file. Created (with parent directories) if absent.
    pub database_path: PathBuf,

    /// Reader pool size. `None` uses the CPU count, clamped to 1..=16.
    pub reader_threads: Option<usize>,

    /// How long a unit waits for a row lock.
    pub lock_timeout_ms: u64,

    /// Group commit window.
    pub batch_timeout_ms: u64,

    /// Maximum batches per group commit.
    pub batch_max_size: usize,

    /// Ranking size used when the caller gives none.
    pub top_words_limit: usize,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            reader_threads: None,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            batch_timeout_ms: DEFAULT_BATCH_TIMEOUT_MS,
            batch_max_size: DEFAULT_BATCH_MAX_SIZE,
            top_words_limit: DEFAULT_TOP_WORDS_LIMIT,
        }
    }
}

impl TallyConfig {
    /// Defaults with a different database file.
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("database_path must not be empty".to_string()));
        }
        if self.reader_threads == Some(0) {
            return Err(Error::Config("reader_threads must be at least 1".to_string()));
        }
        if self.lock_timeout_ms == 0 {
            return Err(Error::Config("lock_timeout_ms must be positive".to_string()));
        }
        if self.batch_max_size == 0 {
            return Err(Error::Config("batch_max_size must be positive".to_string()));
        }
        if self.top_words_limit == 0 {
            return Err(Error::Config("top_words_limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Effective reader pool size.
    pub fn reader_threads(&self) -> usize {
        self.reader_threads
            .unwrap_or_else(|| {
                available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(MIN_READER_THREADS)
            })
            .clamp(MIN_READER_THREADS, MAX_READER_THREADS)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            batch_timeout: Duration::from_millis(self.batch_timeout_ms),
            batch_max_size: self.batch_max_size,
        }
    }
}
