//! # Per-Word Row Locks
//!
//! SQLite has no row-level locks, so the engine keeps its own lock table: one
//! async mutex per word, created on first use and removed once nobody holds
//! or waits for it.
//!
//! ```text
//! batch A: unit "cat" ──► acquire(cat) ─── held ─────────────► release after A resolves
//! batch B: unit "cat" ──► acquire(cat) ··· waits ··············► acquired
//! batch B: unit "dog" ──► acquire(dog) ─── held (no contention)
//! ```
//!
//! A [`WordGuard`] releases its lock when dropped. The engine keeps guards
//! alive until the writer has committed or rolled back the batch, so a second
//! batch touching the same word always reads the first batch's outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{Error, Result};
use crate::types::Word;

type Slot = Arc<AsyncMutex<()>>;

/// Table of per-word exclusive locks.
#[derive(Debug, Default)]
pub struct WordLocks {
    slots: Mutex<HashMap<Word, Slot>>,
}

impl WordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<Word, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the exclusive lock for `word`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// `Error::LockTimeout` if the lock is still held when the timeout expires.
    pub async fn acquire(self: &Arc<Self>, word: &Word, timeout: Duration) -> Result<WordGuard> {
        let slot = {
            let mut table = self.table();
            Arc::clone(
                table
                    .entry(word.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };

        let started = Instant::now();
        let acquired = tokio::time::timeout(timeout, slot.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(WordGuard {
                word: word.clone(),
                guard: Some(guard),
                locks: Arc::clone(self),
            }),
            Err(_) => {
                self.forget_if_idle(word);
                Err(Error::LockTimeout {
                    word: word.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                })
            }
        }
    }

    /// Removes the slot for `word` if only the table still references it.
    fn forget_if_idle(&self, word: &Word) {
        let mut table = self.table();
        if let Some(slot) = table.get(word) {
            if Arc::strong_count(slot) == 1 {
                table.remove(word);
            }
        }
    }

    /// Number of words currently locked or awaited.
    pub fn active(&self) -> usize {
        self.table().len()
    }

    /// Returns true if `word` is currently locked by someone.
    pub fn is_locked(&self, word: &Word) -> bool {
        self.table()
            .get(word)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }
}

/// Exclusive hold on one word's row. Released on drop.
#[derive(Debug)]
pub struct WordGuard {
    word: Word,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<WordLocks>,
}

impl WordGuard {
    pub fn word(&self) -> &Word {
        &self.word
    }
}

impl Drop for WordGuard {
    fn drop(&mut self) {
        // Release before checking, so the slot's only remaining owner may be
        // the table itself.
        drop(self.guard.take());
        self.locks.forget_if_idle(&self.word);
    }
}
