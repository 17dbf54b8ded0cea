//! # Domain Types for wordtally
//!
//! This module defines the types that flow between ingress, the tally engine,
//! and the counter store.
//!
//! ## Design Philosophy: Newtypes for Safety
//!
//! As elsewhere in the crate we wrap primitives in single-field structs:
//!
//! - [`Word`] can only be built through normalization, so every key that
//!   reaches storage is already lower-cased
//! - [`RecordId`] cannot be confused with a count
//!
//! ## Invariants
//!
//! - A [`Batch`] holds at most one entry per normalized word, and every
//!   increment is at least 1
//! - A [`StagedWrite`] with `id == None` creates a row; otherwise it updates
//!   the row with that identity, guarded by `previous`

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::{Error, Result};

/// Largest count a row can hold (SQLite INTEGER is a signed 64-bit value).
pub const MAX_COUNT: u64 = i64::MAX as u64;

// =============================================================================
// Words
// =============================================================================

/// A normalized word: the key of a counter row.
///
/// # Normalization
///
/// Counting is case-insensitive, so `Word::new("Cat")` and `Word::new("cat")`
/// are equal. Only ASCII letters are lower-cased; ingress rejects anything
/// else before a `Word` is built.
///
/// # Ordering
///
/// `Word` is `Ord` (byte order of the normalized text). The engine relies on
/// this order to acquire row locks in the same sequence for every batch.
///
/// ```rust
/// use wordtally::types::Word;
///
/// assert_eq!(Word::new("Cat"), Word::new("cat"));
/// assert_eq!(Word::new("DOG").as_str(), "dog");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Word(String);

impl Word {
    /// Creates a word, normalizing it to lower case.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().to_ascii_lowercase())
    }

    /// Returns the normalized text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Word {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Word {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Storage identity of a counter row.
///
/// Assigned by SQLite (`INTEGER PRIMARY KEY AUTOINCREMENT`) when the row is
/// created and used only to address that row on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(i64);

impl RecordId {
    /// Creates a RecordId from a raw value read from the database.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value for database storage.
    pub fn as_raw(&self) -> i64 {
        self.0
    }
}

// =============================================================================
// Records
// =============================================================================

/// One row of the `words` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    /// Storage identity.
    pub id: RecordId,
    /// Normalized word (unique).
    pub word: Word,
    /// Cumulative number of occurrences.
    pub count: u64,
}

/// A `(word, count)` pair returned by the ranking query.
///
/// Serializes as `{"word": "...", "count": N}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordCount {
    pub word: String,
    pub count: u64,
}

impl WordCount {
    pub fn new(word: impl Into<String>, count: u64) -> Self {
        Self {
            word: word.into(),
            count,
        }
    }
}

// =============================================================================
// Batches
// =============================================================================

/// The per-word increments of one submitted batch.
///
/// # Aggregation
///
/// Duplicate occurrences are summed into a single entry, so a word that
/// appears `k` times produces one unit of work with increment `k` rather than
/// `k` units racing on the same row.
///
/// # Rust Pattern: BTreeMap
///
/// A `BTreeMap` keeps entries sorted by [`Word`]. Iteration order is the lock
/// acquisition order used by the engine.
///
/// ```rust
/// use wordtally::types::{Batch, Word};
///
/// let batch = Batch::from_tokens(["cat", "dog", "Cat", ""]);
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch.increment_of(&Word::new("cat")), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    increments: BTreeMap<Word, u64>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a batch from raw tokens, dropping empty ones.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut batch = Self::new();
        for token in tokens {
            let token = token.as_ref();
            if token.is_empty() {
                continue;
            }
            batch.add(Word::new(token), 1);
        }
        batch
    }

    /// Adds `increment` occurrences of `word`. Zero increments are ignored.
    ///
    /// Totals saturate at `u64::MAX`; anything above [`MAX_COUNT`] is
    /// rejected when the write is staged.
    pub fn add(&mut self, word: Word, increment: u64) -> &mut Self {
        if increment > 0 {
            let total = self.increments.entry(word).or_insert(0);
            *total = total.saturating_add(increment);
        }
        self
    }

    /// Returns the increment recorded for `word`, or 0.
    pub fn increment_of(&self, word: &Word) -> u64 {
        self.increments.get(word).copied().unwrap_or(0)
    }

    /// Number of distinct words (one unit of work each).
    pub fn len(&self) -> usize {
        self.increments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.increments.is_empty()
    }

    /// Sum of all increments.
    pub fn total_increments(&self) -> u64 {
        self.increments
            .values()
            .fold(0u64, |sum, n| sum.saturating_add(*n))
    }

    /// Iterates entries in word order.
    pub fn iter(&self) -> impl Iterator<Item = (&Word, u64)> {
        self.increments.iter().map(|(w, n)| (w, *n))
    }
}

impl IntoIterator for Batch {
    type Item = (Word, u64);
    type IntoIter = btree_map::IntoIter<Word, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.increments.into_iter()
    }
}

impl FromIterator<(Word, u64)> for Batch {
    fn from_iter<T: IntoIterator<Item = (Word, u64)>>(iter: T) -> Self {
        let mut batch = Self::new();
        for (word, increment) in iter {
            batch.add(word, increment);
        }
        batch
    }
}

// =============================================================================
// Staged Writes
// =============================================================================

/// The record a unit of work staged for its word.
///
/// Produced while the unit holds the word's row lock, applied later by the
/// writer inside the batch's transactional envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWrite {
    /// Word being counted.
    pub word: Word,
    /// Existing row identity, or `None` if the row is being created.
    pub id: Option<RecordId>,
    /// Count observed when the unit read the row (0 for new rows).
    pub previous: u64,
    /// Count to store.
    pub count: u64,
}

impl StagedWrite {
    /// Stages an increment on top of an existing record (or a fresh one).
    ///
    /// # Errors
    ///
    /// `Error::CountOverflow` if the new count would exceed [`MAX_COUNT`].
    pub fn increment(word: Word, existing: Option<CounterRecord>, increment: u64) -> Result<Self> {
        let (id, previous) = match existing {
            Some(record) => (Some(record.id), record.count),
            None => (None, 0),
        };

        let count = match previous.checked_add(increment) {
            Some(count) if count <= MAX_COUNT => count,
            _ => {
                return Err(Error::CountOverflow {
                    word: word.to_string(),
                    max: MAX_COUNT,
                })
            }
        };

        Ok(Self {
            word,
            id,
            previous,
            count,
        })
    }

    /// Returns true if applying this write creates the row.
    pub fn is_create(&self) -> bool {
        self.id.is_none()
    }
}

/// Acknowledgement of a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReceipt {
    /// Distinct words applied.
    pub words: usize,
    /// Rows created by this batch.
    pub created: usize,
    /// Sum of increments applied.
    pub increments: u64,
}

// =============================================================================
// Time
// =============================================================================

/// Current Unix time in milliseconds, used for bookkeeping columns.
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
