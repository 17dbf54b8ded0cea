//! # Batch Tally Engine
//!
//! Applies one [`Batch`] of per-word increments all or nothing.
//!
//! ## Two Phases
//!
//! ```text
//!                 apply(batch)
//!                      │
//!        ┌─────────────┼─────────────┐          phase 1: one task per word
//!        ▼             ▼             ▼
//!   unit "cat"    unit "dog"    unit "fig"      lock → read → stage
//!        │             │             │
//!        └──── oneshot reports ──────┘
//!                      │
//!                 join_all (drain every report)
//!                      │
//!          any failure? ──yes──► release locks, AggregateFailure
//!                      │no
//!                      ▼                        phase 2: writer thread
//!          SAVEPOINT batch ─ SAVEPOINT unit ... ─ RELEASE / ROLLBACK TO
//!                      │
//!                release locks
//! ```
//!
//! Units never write. They stage the record they would store while holding
//! the word's lock, and the writer applies every staged record inside one
//! batch savepoint only after all units have succeeded. A failure in either
//! phase leaves storage untouched for every word of the batch.
//!
//! ## Lock Ordering
//!
//! Units acquire their locks in word order: unit *i* waits until unit *i-1*
//! has acquired (or given up on) its lock before trying its own. Every batch
//! uses the same global order, so two batches sharing words can't deadlock;
//! the later one queues behind the earlier one word by word. Locks are held
//! until the writer has resolved the batch.
//!
//! ## Cancellation
//!
//! Units are spawned tasks. Dropping the `apply` future does not cancel them:
//! they finish staging, fail to deliver their report, and drop their guards.
//! If the future is dropped while the writer is applying, the writer still
//! commits or rolls back; the identity-and-count guard on every update keeps
//! a later batch from overwriting a row it read before that commit.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::locks::{WordGuard, WordLocks};
use crate::reader::ReadHandle;
use crate::types::{Batch, BatchReceipt, StagedWrite, Word};
use crate::writer::CounterWriterHandle;

/// Default time a unit waits for its row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a unit waits for its word's lock before failing.
    pub lock_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// What a successful unit hands back: the staged record and the lock that
/// protects it.
struct UnitOutcome {
    staged: StagedWrite,
    guard: WordGuard,
}

/// One word's share of a batch.
struct Unit {
    word: Word,
    increment: u64,
    /// Fires when the previous unit has acquired its lock (or dropped).
    after: Option<oneshot::Receiver<()>>,
    /// Fired once this unit holds its lock.
    acquired: oneshot::Sender<()>,
}

/// Applies batches of word increments against the counter store.
///
/// Cheap to clone; clones share the lock table.
#[derive(Clone)]
pub struct TallyEngine {
    reader: ReadHandle,
    writer: CounterWriterHandle,
    locks: Arc<WordLocks>,
    config: EngineConfig,
}

impl TallyEngine {
    pub fn new(reader: ReadHandle, writer: CounterWriterHandle, config: EngineConfig) -> Self {
        Self {
            reader,
            writer,
            locks: Arc::new(WordLocks::new()),
            config,
        }
    }

    /// The shared row-lock table.
    pub fn locks(&self) -> &Arc<WordLocks> {
        &self.locks
    }

    /// Applies every increment of `batch`, or none of them.
    ///
    /// # Errors
    ///
    /// - `Error::EmptyBatch` if the batch has no words
    /// - `Error::AggregateFailure` if any unit failed or the commit failed;
    ///   storage is unchanged for every word of the batch
    pub async fn apply(&self, batch: Batch) -> Result<BatchReceipt> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let total = batch.len();
        let mut reports = Vec::with_capacity(total);
        let mut previous: Option<oneshot::Receiver<()>> = None;

        for (word, increment) in batch {
            let (acquired_tx, acquired_rx) = oneshot::channel();
            let (report_tx, report_rx) = oneshot::channel();

            let unit = Unit {
                word,
                increment,
                after: previous.take(),
                acquired: acquired_tx,
            };
            tokio::spawn(run_unit(
                unit,
                self.reader.clone(),
                Arc::clone(&self.locks),
                self.config.lock_timeout,
                report_tx,
            ));

            previous = Some(acquired_rx);
            reports.push(report_rx);
        }

        // Drain every report before deciding.
        let mut staged = Vec::with_capacity(total);
        let mut guards = Vec::with_capacity(total);
        let mut causes = Vec::new();
        for report in join_all(reports).await {
            match report {
                Ok(Ok(outcome)) => {
                    staged.push(outcome.staged);
                    guards.push(outcome.guard);
                }
                Ok(Err(e)) => causes.push(e.to_string()),
                Err(_) => causes.push("unit exited without reporting".to_string()),
            }
        }

        if !causes.is_empty() {
            drop(guards);
            tracing::warn!(words = total, failed = causes.len(), "batch rolled back before write");
            return Err(Error::AggregateFailure {
                failed: causes.len(),
                total,
                causes,
            });
        }

        let result = self.writer.apply(staged).await;
        drop(guards);

        match &result {
            Ok(receipt) => tracing::debug!(
                words = receipt.words,
                created = receipt.created,
                increments = receipt.increments,
                "batch committed"
            ),
            Err(e) => tracing::warn!(words = total, error = %e, "batch rolled back"),
        }
        result
    }
}

/// Runs one unit and delivers its report.
async fn run_unit(
    unit: Unit,
    reader: ReadHandle,
    locks: Arc<WordLocks>,
    lock_timeout: Duration,
    report: oneshot::Sender<Result<UnitOutcome>>,
) {
    let word = unit.word.clone();
    let result = stage(unit, reader, locks, lock_timeout).await;
    if let Err(e) = &result {
        tracing::error!(word = %word, error = %e, "tally unit failed");
    }
    let _ = report.send(result);
}

/// Lock, read, and stage one word's new record.
async fn stage(
    unit: Unit,
    reader: ReadHandle,
    locks: Arc<WordLocks>,
    lock_timeout: Duration,
) -> Result<UnitOutcome> {
    let Unit {
        word,
        increment,
        after,
        acquired,
    } = unit;

    if let Some(after) = after {
        // A dropped sender means the predecessor gave up; proceed either way.
        let _ = after.await;
    }

    let guard = locks.acquire(&word, lock_timeout).await?;
    let _ = acquired.send(());

    let existing = reader.find_record(word.clone()).await?;
    Ok(UnitOutcome {
        staged: StagedWrite::increment(word, existing, increment)?,
        guard,
    })
}
