//! # Counter Writer with Group Commit
//!
//! The writer owns the only read-write SQLite connection. It receives the
//! staged writes of fully prepared batches and applies them inside one outer
//! transaction, using nested SAVEPOINTs for batch and unit scopes.
//!
//! ## Scope Nesting
//!
//! ```text
//! BEGIN IMMEDIATE                         ← outer transaction (group commit)
//!   SAVEPOINT batch_0                     ← one tally batch: all-or-nothing
//!     SAVEPOINT batch_0_unit_0            ← one word's insert/update
//!     RELEASE   batch_0_unit_0
//!     SAVEPOINT batch_0_unit_1
//!     ROLLBACK TO batch_0_unit_1          ← unit failed
//!   ROLLBACK TO batch_0                   ← so the whole batch is discarded
//!   SAVEPOINT batch_1
//!     ...
//!   RELEASE batch_1                       ← every unit succeeded
//! COMMIT                                  ← one fsync for the whole group
//! ```
//!
//! A failed unit never aborts the remaining units of its batch: every staged
//! write is attempted and every failure is logged before the batch savepoint
//! is rolled back. A failed batch never affects other batches in the group.
//!
//! ## Why Group Commit?
//!
//! Concurrent batches on disjoint words resolve at roughly the same time.
//! Collecting them over a short window amortizes the commit fsync:
//!
//! ```text
//! Without batching:                With batching:
//! ┌──────────────────────────┐     ┌──────────────────────────┐
//! │ batch1 → BEGIN → COMMIT  │     │ BEGIN                    │
//! │ batch2 → BEGIN → COMMIT  │     │   SAVEPOINT batch_0      │
//! │ batch3 → BEGIN → COMMIT  │     │   SAVEPOINT batch_1      │
//! │ 3 fsyncs                 │     │   SAVEPOINT batch_2      │
//! └──────────────────────────┘     │ COMMIT (1 fsync)         │
//!                                  └──────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - Updates are addressed by identity and guarded by the previously
//!   observed count, so a stale staged record can never overwrite a newer one
//! - A batch response is sent only after the outer transaction has committed
//!   or rolled back

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rusqlite::{params, Connection};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::types::{current_time_ms, BatchReceipt, StagedWrite, MAX_COUNT};

// =============================================================================
// Configuration
// =============================================================================

/// Default group commit window in milliseconds.
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 10;

/// Maximum tally batches per group commit.
pub const DEFAULT_BATCH_MAX_SIZE: usize = 1000;

/// Size of the request channel.
const REQUEST_CHANNEL_SIZE: usize = 4096;

/// Configuration for the counter writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum time to wait for more batches before committing.
    pub batch_timeout: Duration,

    /// Maximum tally batches per commit.
    pub batch_max_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_timeout: Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
            batch_max_size: DEFAULT_BATCH_MAX_SIZE,
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// A request sent to the writer thread.
pub enum WriteRequest {
    /// Apply every staged write of one tally batch, all or nothing.
    Apply {
        writes: Vec<StagedWrite>,
        response: oneshot::Sender<Result<BatchReceipt>>,
    },

    /// Flush pending batches and stop.
    Shutdown,
}

struct PendingBatch {
    writes: Vec<StagedWrite>,
    response: oneshot::Sender<Result<BatchReceipt>>,
}

// =============================================================================
// Counter Writer
// =============================================================================

/// The writer that applies staged batches.
///
/// Runs on a dedicated thread; use [`CounterWriterHandle`] from async code.
pub struct CounterWriter {
    conn: Connection,
}

impl CounterWriter {
    /// Creates a writer over an initialized connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Applies a group of batches in one outer transaction and answers each.
    fn execute_group(&mut self, items: Vec<PendingBatch>) {
        if items.is_empty() {
            return;
        }

        let mut batches = Vec::with_capacity(items.len());
        let mut responses = Vec::with_capacity(items.len());
        for item in items {
            batches.push(item.writes);
            responses.push(item.response);
        }

        match self.execute_group_inner(&batches) {
            Ok(results) => {
                let committed = results.iter().filter(|r| r.is_ok()).count();
                tracing::debug!(
                    batches = batches.len(),
                    committed,
                    rolled_back = batches.len() - committed,
                    "group committed"
                );
                for (response, result) in responses.into_iter().zip(results) {
                    let _ = response.send(result);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, batches = batches.len(), "group commit failed, rolled back");
                for (response, writes) in responses.into_iter().zip(&batches) {
                    let _ = response.send(Err(Error::aggregate(
                        writes.len(),
                        format!("commit failed: {e}"),
                    )));
                }
            }
        }
    }

    /// Runs the outer transaction.
    ///
    /// The outer `Err` means the transaction itself failed and was rolled
    /// back; the inner results are per-batch outcomes.
    fn execute_group_inner(
        &mut self,
        batches: &[Vec<StagedWrite>],
    ) -> Result<Vec<Result<BatchReceipt>>> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;

        let mut results = Vec::with_capacity(batches.len());
        for (index, writes) in batches.iter().enumerate() {
            match self.apply_batch_in_savepoint(index, writes) {
                Ok(result) => results.push(result),
                Err(e) => {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(e);
                }
            }
        }

        match self.conn.execute_batch("COMMIT") {
            Ok(()) => Ok(results),
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e.into())
            }
        }
    }

    /// Applies one tally batch inside its own SAVEPOINT.
    fn apply_batch_in_savepoint(
        &mut self,
        index: usize,
        writes: &[StagedWrite],
    ) -> Result<Result<BatchReceipt>> {
        let sp_name = format!("batch_{index}");
        self.conn.execute_batch(&format!("SAVEPOINT {sp_name}"))?;

        let now_ms = current_time_ms();
        let mut receipt = BatchReceipt {
            words: writes.len(),
            created: 0,
            increments: 0,
        };
        let mut causes = Vec::new();

        for (unit, write) in writes.iter().enumerate() {
            match self.apply_write_in_savepoint(&sp_name, unit, write, now_ms)? {
                Ok(()) => {
                    if write.is_create() {
                        receipt.created += 1;
                    }
                    receipt.increments = receipt
                        .increments
                        .saturating_add(write.count.saturating_sub(write.previous));
                }
                Err(e) => {
                    tracing::error!(word = %write.word, error = %e, "staged write failed");
                    causes.push(e.to_string());
                }
            }
        }

        if causes.is_empty() {
            self.conn.execute_batch(&format!("RELEASE {sp_name}"))?;
            Ok(Ok(receipt))
        } else {
            self.conn
                .execute_batch(&format!("ROLLBACK TO {sp_name}; RELEASE {sp_name}"))?;
            Ok(Err(Error::AggregateFailure {
                failed: causes.len(),
                total: writes.len(),
                causes,
            }))
        }
    }

    /// Applies one staged write inside a nested SAVEPOINT.
    fn apply_write_in_savepoint(
        &mut self,
        batch_sp: &str,
        unit: usize,
        write: &StagedWrite,
        now_ms: u64,
    ) -> Result<Result<()>> {
        let sp_name = format!("{batch_sp}_unit_{unit}");
        self.conn.execute_batch(&format!("SAVEPOINT {sp_name}"))?;

        match self.apply_write(write, now_ms) {
            Ok(()) => {
                self.conn.execute_batch(&format!("RELEASE {sp_name}"))?;
                Ok(Ok(()))
            }
            Err(e) => {
                self.conn
                    .execute_batch(&format!("ROLLBACK TO {sp_name}; RELEASE {sp_name}"))?;
                Ok(Err(e))
            }
        }
    }

    /// Insert-if-absent or update-by-identity for one word.
    fn apply_write(&self, write: &StagedWrite, now_ms: u64) -> Result<()> {
        let count = storable(write, write.count)?;
        let previous = storable(write, write.previous)?;
        let now_ms = i64::try_from(now_ms).unwrap_or(i64::MAX);

        match write.id {
            None => {
                self.conn.execute(
                    "INSERT INTO words (word, count, created_ms, updated_ms)
                     VALUES (?, ?, ?, ?)",
                    params![
                        write.word.as_str(),
                        count,
                        now_ms,
                        now_ms,
                    ],
                )?;
            }
            Some(id) => {
                let changed = self.conn.execute(
                    "UPDATE words SET count = ?, updated_ms = ?
                     WHERE id = ? AND count = ?",
                    params![
                        count,
                        now_ms,
                        id.as_raw(),
                        previous,
                    ],
                )?;
                if changed != 1 {
                    return Err(Error::StaleRecord {
                        word: write.word.to_string(),
                        expected: write.previous,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Converts a count to SQLite's signed INTEGER.
fn storable(write: &StagedWrite, count: u64) -> Result<i64> {
    i64::try_from(count).map_err(|_| Error::CountOverflow {
        word: write.word.to_string(),
        max: MAX_COUNT,
    })
}

// =============================================================================
// Writer Handle (Async Interface)
// =============================================================================

/// Async handle to the writer thread.
#[derive(Clone)]
pub struct CounterWriterHandle {
    tx: mpsc::Sender<WriteRequest>,
}

impl CounterWriterHandle {
    /// Applies the staged writes of one batch, all or nothing.
    ///
    /// # Errors
    ///
    /// `Error::AggregateFailure` if any write failed or the commit failed;
    /// `Error::Unavailable` if the writer has stopped.
    pub async fn apply(&self, writes: Vec<StagedWrite>) -> Result<BatchReceipt> {
        if writes.is_empty() {
            return Ok(BatchReceipt {
                words: 0,
                created: 0,
                increments: 0,
            });
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(WriteRequest::Apply {
                writes,
                response: response_tx,
            })
            .await
            .map_err(|_| Error::Unavailable("writer has shut down".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Unavailable("writer dropped response".to_string()))?
    }

    /// Asks the writer to flush and stop.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(WriteRequest::Shutdown).await;
    }
}

// =============================================================================
// Writer Loop
// =============================================================================

/// Runs the writer loop, grouping batches that arrive within the window.
pub async fn run_counter_writer(
    mut writer: CounterWriter,
    mut rx: mpsc::Receiver<WriteRequest>,
    config: WriterConfig,
) {
    let mut group: Vec<PendingBatch> = Vec::new();
    let mut group_start: Option<Instant> = None;

    loop {
        let wait_timeout = match group_start {
            None => Duration::from_secs(3600),
            Some(start) => config.batch_timeout.saturating_sub(start.elapsed()),
        };

        match timeout(wait_timeout, rx.recv()).await {
            Ok(Some(WriteRequest::Apply { writes, response })) => {
                if group.is_empty() {
                    group_start = Some(Instant::now());
                }
                group.push(PendingBatch { writes, response });

                if group.len() >= config.batch_max_size {
                    writer.execute_group(std::mem::take(&mut group));
                    group_start = None;
                }
            }
            Ok(Some(WriteRequest::Shutdown)) | Ok(None) => {
                writer.execute_group(std::mem::take(&mut group));
                break;
            }
            Err(_) => {
                writer.execute_group(std::mem::take(&mut group));
                group_start = None;
            }
        }
    }

    tracing::info!("counter writer stopped");
}

/// Spawns the writer on a dedicated thread.
///
/// Returns the handle for submitting batches and the thread's join handle.
pub fn spawn_counter_writer(
    conn: Connection,
    config: WriterConfig,
) -> Result<(CounterWriterHandle, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
    let writer = CounterWriter::new(conn);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let thread = std::thread::Builder::new()
        .name("wordtally-writer".to_string())
        .spawn(move || {
            rt.block_on(run_counter_writer(writer, rx, config));
        })?;

    Ok((CounterWriterHandle { tx }, thread))
}

// =============================================================================
// Tests
// =============================================================================
