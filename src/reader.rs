//! # Counter Reader
//!
//! Read operations against the `words` table: the locked point lookup used by
//! tally units and the ranking query.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                   Reader Pool                      │
//! │  ┌─────────┐  ┌─────────┐        ┌─────────┐       │
//! │  │Reader 1 │  │Reader 2 │  ...   │Reader N │       │
//! │  └────┬────┘  └────┬────┘        └────┬────┘       │
//! │       └────────────┴──────────────────┘            │
//! │               read-only connections                │
//! └────────────────────────┬───────────────────────────┘
//!                          ▼
//!                   SQLite (WAL mode)
//! ```
//!
//! Every query runs in autocommit mode on its own read-only connection, so
//! it observes the latest committed state and never blocks the writer.
//!
//! Readers take no row locks. The point lookup is only "locked" because the
//! calling unit already holds the word's [`WordGuard`](crate::locks::WordGuard).

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::types::{CounterRecord, RecordId, Word, WordCount};

// =============================================================================
// Request Types
// =============================================================================

/// Request type for read operations.
pub enum ReadRequest {
    /// Look up the committed record for one word.
    FindRecord {
        word: Word,
        response: oneshot::Sender<Result<Option<CounterRecord>>>,
    },
    /// Top words by count.
    TopWords {
        limit: usize,
        response: oneshot::Sender<Result<Vec<WordCount>>>,
    },
    /// Stop the receiving reader thread.
    Shutdown,
}

// =============================================================================
// Direct Read Functions
// =============================================================================

/// Finds the committed record for `word`.
///
/// Returns `None` if the word has never been counted.
pub fn find_record(conn: &Connection, word: &Word) -> Result<Option<CounterRecord>> {
    let record = conn
        .query_row(
            "SELECT id, word, count FROM words WHERE word = ?",
            params![word.as_str()],
            |row| {
                let id: i64 = row.get(0)?;
                let word: String = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok(CounterRecord {
                    id: RecordId::from_raw(id),
                    word: Word::new(word),
                    count: count as u64,
                })
            },
        )
        .optional()?;

    Ok(record)
}

/// Returns the committed count for `word` (0 if absent).
pub fn get_count(conn: &Connection, word: &Word) -> Result<u64> {
    Ok(find_record(conn, word)?.map(|r| r.count).unwrap_or(0))
}

/// Returns at most `limit` words ordered by count, highest first.
///
/// Ties keep storage order (ascending identity), which is stable for a given
/// table state.
pub fn top_words(conn: &Connection, limit: usize) -> Result<Vec<WordCount>> {
    let mut stmt = conn.prepare_cached(
        "SELECT word, count FROM words
         ORDER BY count DESC, id ASC
         LIMIT ?",
    )?;

    let rows = stmt.query_map(params![limit as i64], |row| {
        let word: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok(WordCount::new(word, count as u64))
    })?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// Sum of all counts in the table.
pub fn total_count(conn: &Connection) -> Result<u64> {
    let total: i64 = conn.query_row("SELECT COALESCE(SUM(count), 0) FROM words", [], |row| {
        row.get(0)
    })?;
    Ok(total as u64)
}

// =============================================================================
// Reader Loop
// =============================================================================

/// Pooled reader loop.
///
/// Several threads share one receiver; whichever thread is idle picks up the
/// next request. Each thread owns its read-only connection.
pub async fn run_reader_pooled(
    conn: Connection,
    rx: Arc<Mutex<mpsc::Receiver<ReadRequest>>>,
) {
    loop {
        let request = {
            let mut guard = rx.lock().unwrap_or_else(PoisonError::into_inner);
            guard.recv().await
        };

        match request {
            Some(ReadRequest::FindRecord { word, response }) => {
                let _ = response.send(find_record(&conn, &word));
            }
            Some(ReadRequest::TopWords { limit, response }) => {
                let result = top_words(&conn, limit);
                if let Err(e) = &result {
                    tracing::error!(error = %e, limit, "ranking query failed");
                }
                let _ = response.send(result);
            }
            Some(ReadRequest::Shutdown) | None => break,
        }
    }
}

/// Size of the read request channel.
const READ_CHANNEL_SIZE: usize = 4096;

/// Spawns `count` reader threads over read-only connections to `path`.
///
/// Connections and runtimes are created up front so that a failure is
/// reported here rather than inside a thread.
pub fn spawn_reader_pool(
    path: &Path,
    count: usize,
) -> Result<(ReadHandle, Vec<JoinHandle<()>>)> {
    let (tx, rx) = mpsc::channel(READ_CHANNEL_SIZE);
    let rx = Arc::new(Mutex::new(rx));

    let mut threads = Vec::with_capacity(count);
    for i in 0..count {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(crate::schema::BUSY_TIMEOUT)?;

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let rx = Arc::clone(&rx);

        let thread = std::thread::Builder::new()
            .name(format!("wordtally-reader-{i}"))
            .spawn(move || rt.block_on(run_reader_pooled(conn, rx)))?;
        threads.push(thread);
    }

    Ok((ReadHandle::new(tx), threads))
}

// =============================================================================
// Read Handle
// =============================================================================

/// Async handle to the reader pool.
#[derive(Clone)]
pub struct ReadHandle {
    tx: mpsc::Sender<ReadRequest>,
}

impl ReadHandle {
    pub fn new(tx: mpsc::Sender<ReadRequest>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ReadRequest,
    ) -> Result<T> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(build(response_tx))
            .await
            .map_err(|_| Error::Unavailable("reader pool has shut down".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Unavailable("reader dropped response channel".to_string()))
    }

    /// Looks up the committed record for `word`.
    pub async fn find_record(&self, word: Word) -> Result<Option<CounterRecord>> {
        self.request(|response| ReadRequest::FindRecord { word, response })
            .await?
    }

    /// Returns the committed count for `word` (0 if absent).
    pub async fn count_of(&self, word: Word) -> Result<u64> {
        Ok(self.find_record(word).await?.map(|r| r.count).unwrap_or(0))
    }

    /// Runs the ranking query.
    ///
    /// # Errors
    ///
    /// `Error::Validation` if `limit` is zero; storage errors verbatim.
    pub async fn top_words(&self, limit: usize) -> Result<Vec<WordCount>> {
        if limit == 0 {
            return Err(Error::Validation("limit must be a positive integer".to_string()));
        }
        self.request(|response| ReadRequest::TopWords { limit, response })
            .await?
    }

    /// Asks one reader thread to exit.
    pub async fn shutdown_one(&self) {
        let _ = self.tx.send(ReadRequest::Shutdown).await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Database;

    fn seed(conn: &Connection, counts: &[(&str, u64)]) {
        for (word, count) in counts {
            conn.execute(
                "INSERT INTO words (word, count, created_ms, updated_ms) VALUES (?, ?, 0, 0)",
                params![word, *count as i64],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_find_record() {
        let db = Database::open_in_memory().unwrap();
        seed(db.connection(), &[("cat", 4)]);

        let record = find_record(db.connection(), &Word::new("cat")).unwrap().unwrap();
        assert_eq!(record.word.as_str(), "cat");
        assert_eq!(record.count, 4);

        assert!(find_record(db.connection(), &Word::new("dog")).unwrap().is_none());
        assert_eq!(get_count(db.connection(), &Word::new("dog")).unwrap(), 0);
    }

    #[test]
    fn test_top_words_order_and_limit() {
        let db = Database::open_in_memory().unwrap();
        seed(db.connection(), &[("a", 5), ("b", 9), ("c", 2), ("d", 9)]);

        let top = top_words(db.connection(), 3).unwrap();
        assert_eq!(top.len(), 3);
        // b and d tie at 9; storage order puts b (inserted first) ahead.
        assert_eq!(top[0], WordCount::new("b", 9));
        assert_eq!(top[1], WordCount::new("d", 9));
        assert_eq!(top[2], WordCount::new("a", 5));

        let all = top_words(db.connection(), 10).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3], WordCount::new("c", 2));
    }

    #[test]
    fn test_top_words_empty_table() {
        let db = Database::open_in_memory().unwrap();
        assert!(top_words(db.connection(), 10).unwrap().is_empty());
    }

    #[test]
    fn test_total_count() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(total_count(db.connection()).unwrap(), 0);

        seed(db.connection(), &[("a", 5), ("b", 2)]);
        assert_eq!(total_count(db.connection()).unwrap(), 7);
    }
}
