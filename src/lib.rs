//! # wordtally - Word Frequency Tally Service
//!
//! wordtally keeps one cumulative counter per word in SQLite. It provides:
//!
//! - **All-or-nothing batches**: every word of a submitted batch is counted,
//!   or none is
//! - **Concurrent units**: each word of a batch is staged by its own task
//!   under a per-word row lock
//! - **Group commit**: concurrently resolved batches share one transaction,
//!   each isolated in its own SAVEPOINT
//! - **Ranking**: the most frequent words, highest count first
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Async API Layer                          │
//! │                  (add_words, apply, top_words)                  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Tally Engine                             │
//! │        (one task per word, row locks, drain-all join)           │
//! └──────────────┬───────────────────────────────┬──────────────────┘
//!                │ staged writes                 │ locked lookups
//!                ▼                               ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │        Counter Writer        │  │         Reader Pool          │
//! │ (single thread, SAVEPOINTs)  │  │   (read-only connections)    │
//! └──────────────┬───────────────┘  └──────────────┬───────────────┘
//!                └───────────────┬─────────────────┘
//!                                ▼
//!                          SQLite (WAL)
//! ```
//!
//! ## Core Invariants
//!
//! 1. **One row per word**: the `word` column is UNIQUE
//! 2. **Monotonic counts**: a count only ever grows, by exactly the committed
//!    increments
//! 3. **Atomic batches**: a failed batch leaves every one of its words
//!    untouched, so it can be resubmitted as-is
//! 4. **Opaque failures**: callers see one aggregate error, never which word
//!    failed
//!
//! ## Module Organization
//!
//! - [`error`]: Error type for all failure modes
//! - [`types`]: Domain types (Word, Batch, StagedWrite, ...)
//! - [`schema`]: SQLite DDL and database bootstrap
//! - [`config`]: JSON configuration file
//! - [`ingest`]: Request body validation and tokenizing
//! - [`locks`]: Per-word row locks
//! - [`reader`]: Read queries and the reader pool
//! - [`writer`]: Group-commit writer with SAVEPOINT scopes
//! - [`engine`]: The batch tally engine
//! - [`api`]: Async facade (main entry point)

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for wordtally operations.
pub mod error;

/// Domain types: normalized words, batches, and records.
///
/// Uses the newtype pattern so that un-normalized text can't reach storage.
pub mod types;

/// SQLite schema definitions and database initialization.
pub mod schema;

/// Configuration loaded from `config/dbConfig.json`.
pub mod config;

/// Ingress validation.
///
/// Request bodies must consist of ASCII letters and commas only.
pub mod ingest;

/// Per-word exclusive locks held for the lifetime of a batch.
pub mod locks;

/// Read operations against committed state.
///
/// Every reader thread owns its own read-only connection and sees the latest
/// committed data via WAL mode.
pub mod reader;

/// Counter writer with group commit.
///
/// Batches that resolve within a short window (default 10ms) are applied in
/// one SQLite transaction, each inside its own SAVEPOINT with nested
/// per-word SAVEPOINTs:
/// - Group commit for throughput (many batches, one fsync)
/// - SAVEPOINT isolation (a failed batch doesn't affect its neighbours)
pub mod writer;

/// Batch tally engine.
///
/// Fans a batch out into one task per word, drains every result, and only
/// then decides whether the writer may apply the staged records.
pub mod engine;

/// Async API for wordtally.
///
/// The main entry point is [`WordTally`](api::WordTally).
pub mod api;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{WordTally, SUCCESS_MESSAGE};
pub use config::TallyConfig;
pub use engine::{EngineConfig, TallyEngine};
pub use error::{Error, Result};
pub use ingest::BatchRequest;
pub use schema::Database;
pub use writer::{spawn_counter_writer, CounterWriterHandle, WriterConfig};

pub use types::{Batch, BatchReceipt, CounterRecord, RecordId, StagedWrite, Word, WordCount};
