//! # Error Handling for wordtally
//!
//! This module defines the error type used throughout the crate. A single
//! error enum ([`Error`]) represents every failure mode, which keeps function
//! signatures short and lets callers match on exactly the cases they care
//! about.
//!
//! ## Rust Pattern: thiserror
//!
//! We use the `thiserror` crate to derive `std::error::Error` implementations:
//! - `Display` comes from the `#[error(...)]` attributes
//! - `From` conversions come from `#[from]`, so `?` works on rusqlite and I/O
//!   errors without manual mapping
//!
//! ## Error Categories
//!
//! | Category   | Variants                                   | Typical Response          |
//! |------------|--------------------------------------------|---------------------------|
//! | Validation | `Validation`, `EmptyBatch`                 | Reject request, no retry  |
//! | Unit       | `LockTimeout`, `StaleRecord`, `CountOverflow`, `Sqlite` | Folded into aggregate |
//! | Aggregate  | `AggregateFailure`                         | Report internal error     |
//! | Ambient    | `Schema`, `Config`, `Io`, `Json`, `Unavailable` | Log and investigate  |
//!
//! Per-unit errors never reach the caller of a batch directly. The engine logs
//! each one and reports a single [`Error::AggregateFailure`] instead.

use thiserror::Error;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in wordtally operations.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation Errors (rejected before reaching the engine)
    // =========================================================================

    /// The submitted input does not satisfy the ingress policy.
    ///
    /// Raised for empty bodies, characters outside `[A-Za-z,]`, or a ranking
    /// limit of zero. Never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A batch with no words was handed to the engine.
    #[error("batch contains no words")]
    EmptyBatch,

    // =========================================================================
    // Unit Errors (logged, then folded into AggregateFailure)
    // =========================================================================

    /// A unit could not acquire the row lock for its word in time.
    ///
    /// # When This Happens
    ///
    /// Another batch holds the word and has not resolved within the
    /// configured lock timeout.
    #[error("timed out after {waited_ms}ms waiting for lock on word '{word}'")]
    LockTimeout {
        /// The word whose lock was contended
        word: String,
        /// How long the unit waited
        waited_ms: u64,
    },

    /// The row changed between the unit's read and the writer's update.
    ///
    /// The update is guarded by the count the unit observed. Zero affected
    /// rows means the staged record no longer matches storage.
    #[error("stale record for word '{word}': expected stored count {expected}")]
    StaleRecord {
        /// The word whose row was modified underneath the unit
        word: String,
        /// The count the unit read before staging its write
        expected: u64,
    },

    /// Applying the increment would take the count past what a SQLite
    /// INTEGER can hold (`i64::MAX`).
    #[error("count for word '{word}' would exceed {max}")]
    CountOverflow {
        /// The word whose count overflowed
        word: String,
        /// Largest storable count
        max: u64,
    },

    /// SQLite operation failed.
    ///
    /// # Rust Pattern: #[from]
    ///
    /// The `#[from]` attribute generates `impl From<rusqlite::Error> for Error`,
    /// so `?` converts storage errors automatically.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // =========================================================================
    // Aggregate Errors (the only failure a batch caller sees)
    // =========================================================================

    /// At least one unit of a batch failed and the whole batch was rolled back.
    ///
    /// # Recovery
    ///
    /// The store is unchanged for every word in the batch, so the caller may
    /// resubmit the same batch. `causes` holds the logged unit errors for
    /// diagnostics. The display text never names words.
    #[error("internal error: batch of {total} word(s) rolled back after {failed} failure(s)")]
    AggregateFailure {
        /// Number of units (or commit steps) that failed
        failed: usize,
        /// Number of distinct words in the batch
        total: usize,
        /// Rendered underlying errors, in completion order
        causes: Vec<String>,
    },

    // =========================================================================
    // Ambient Errors
    // =========================================================================

    /// Schema version mismatch or corruption detected.
    #[error("schema error: {0}")]
    Schema(String),

    /// The configuration file is missing, unreadable, or invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem or thread-spawn failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background thread (writer or reader pool) is no longer running.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Returns true for errors caused by the caller's input.
    ///
    /// Front ends use this to choose between a "bad request" and an
    /// "internal error" response.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::EmptyBatch)
    }

    /// Wraps a single failure as a batch-level aggregate failure.
    pub(crate) fn aggregate(total: usize, cause: impl ToString) -> Self {
        Error::AggregateFailure {
            failed: 1,
            total,
            causes: vec![cause.to_string()],
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
