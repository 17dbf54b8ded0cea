//! # Async API for wordtally
//!
//! [`WordTally`] is the composition root: it opens the database, starts the
//! writer thread and the reader pool, and wires them into a [`TallyEngine`].
//!
//! ## Why Dedicated Threads?
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so a connection can't be
//! shared across tasks behind an `Arc`. Each connection instead lives on its
//! own OS thread and async code talks to it over channels:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Async Tasks                            │
//! │        add_words / apply               top_words / count_of     │
//! └───────────────┬───────────────────────────────────┬─────────────┘
//!                 ▼                                   │
//!         ┌───────────────┐                           │
//!         │  TallyEngine  │── unit lookups ──┐        │
//!         │  (lock table) │                  ▼        ▼
//!         └───────┬───────┘          ┌─────────────────────┐
//!                 ▼                  │     Reader Pool     │
//!         ┌───────────────┐          │   (N threads, R/O)  │
//!         │ CounterWriter │          └──────────┬──────────┘
//!         │ (1 thread,R/W)│                     │
//!         └───────┬───────┘                     │
//!                 └──────────────┬──────────────┘
//!                                ▼
//!                         SQLite (WAL)
//! ```

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::Mutex;

use crate::config::TallyConfig;
use crate::engine::TallyEngine;
use crate::error::Result;
use crate::ingest::BatchRequest;
use crate::reader::{spawn_reader_pool, ReadHandle};
use crate::schema::Database;
use crate::types::{Batch, BatchReceipt, Word, WordCount};
use crate::writer::{spawn_counter_writer, CounterWriterHandle};

/// Acknowledgement returned for an accepted batch.
pub const SUCCESS_MESSAGE: &str = "Successfully added words.";

/// The main async handle for wordtally.
///
/// `WordTally` is `Clone`, `Send`, and `Sync`; all clones share the same
/// writer, reader pool, and lock table.
///
/// # Example
///
/// ```rust,no_run
/// use wordtally::WordTally;
///
/// # async fn run() -> wordtally::Result<()> {
/// let tally = WordTally::open_path("data/words.db").await?;
/// tally.add_words("cat,dog,cat").await?;
///
/// for entry in tally.top_words(10).await? {
///     println!("{} {}", entry.word, entry.count);
/// }
/// tally.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WordTally {
    engine: TallyEngine,
    reader: ReadHandle,
    writer: CounterWriterHandle,
    threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
    reader_count: usize,
    top_words_limit: usize,
}

impl WordTally {
    /// Opens the service with the given configuration.
    pub async fn open(config: TallyConfig) -> Result<Self> {
        config.validate()?;
        let path = config.database_path.clone();

        let db = Database::open(&path)?;
        let (writer, writer_thread) =
            spawn_counter_writer(db.into_connection(), config.writer_config())?;

        let reader_count = config.reader_threads();
        let (reader, mut threads) = spawn_reader_pool(&path, reader_count)?;
        threads.push(writer_thread);

        let engine = TallyEngine::new(reader.clone(), writer.clone(), config.engine_config());

        tracing::info!(
            database = %path.display(),
            readers = reader_count,
            "wordtally started"
        );

        Ok(Self {
            engine,
            reader,
            writer,
            threads: Arc::new(Mutex::new(threads)),
            reader_count,
            top_words_limit: config.top_words_limit,
        })
    }

    /// Opens the service on `path` with default settings.
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(TallyConfig::with_database(path.as_ref())).await
    }

    /// Validates a raw request body and applies it as one batch.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` if the body breaks the ingress policy
    /// - `Error::AggregateFailure` if the batch was rolled back
    pub async fn add_words(&self, raw: &str) -> Result<BatchReceipt> {
        let request = BatchRequest::parse(raw)?;
        let tokens = request.tokens().len();
        let batch = request.into_batch();
        tracing::debug!(
            tokens,
            words = batch.len(),
            increments = batch.total_increments(),
            "batch request accepted"
        );
        self.apply(batch).await
    }

    /// Applies an already-built batch, all or nothing.
    pub async fn apply(&self, batch: Batch) -> Result<BatchReceipt> {
        self.engine.apply(batch).await
    }

    /// Top `limit` words by count.
    pub async fn top_words(&self, limit: usize) -> Result<Vec<WordCount>> {
        self.reader.top_words(limit).await
    }

    /// Top words using the configured default limit.
    pub async fn top_words_default(&self) -> Result<Vec<WordCount>> {
        self.top_words(self.top_words_limit).await
    }

    /// Committed count for one word (0 if never seen).
    pub async fn count_of(&self, word: &str) -> Result<u64> {
        self.reader.count_of(Word::new(word)).await
    }

    pub fn reader_count(&self) -> usize {
        self.reader_count
    }

    /// Stops the reader pool and the writer, waiting for their threads.
    ///
    /// Batches already handed to the writer are flushed first. Other clones
    /// of this handle fail with `Error::Unavailable` afterwards.
    pub async fn shutdown(self) {
        for _ in 0..self.reader_count {
            self.reader.shutdown_one().await;
        }
        self.writer.shutdown().await;

        let threads = std::mem::take(&mut *self.threads.lock().await);
        let joined = tokio::task::spawn_blocking(move || {
            for thread in threads {
                let _ = thread.join();
            }
        })
        .await;
        if joined.is_err() {
            tracing::warn!("failed to join background threads");
        }

        tracing::info!("wordtally stopped");
    }
}
