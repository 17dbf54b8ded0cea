#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use wordtally::{Database, TallyConfig, WordTally};

pub fn create_temp_db_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let _ = Database::open(&path).expect("initialize database");
    (dir, path)
}

pub fn test_config(path: &Path) -> TallyConfig {
    TallyConfig {
        reader_threads: Some(2),
        ..TallyConfig::with_database(path)
    }
}

pub async fn open_tally(path: &Path) -> WordTally {
    WordTally::open(test_config(path)).await.expect("open wordtally")
}

pub fn open_read_only(path: &Path) -> Connection {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .expect("open read-only connection")
}

pub fn open_read_write(path: &Path) -> Connection {
    let conn = Connection::open(path).expect("open read-write connection");
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .expect("set busy timeout");
    conn
}

/// Makes every insert or update of `word` fail inside SQLite.
pub fn install_fault_trigger(path: &Path, word: &str) {
    let conn = open_read_write(path);
    conn.execute_batch(&format!(
        "CREATE TRIGGER fail_insert_{word} BEFORE INSERT ON words
         WHEN NEW.word = '{word}'
         BEGIN SELECT RAISE(ABORT, 'forced failure'); END;
         CREATE TRIGGER fail_update_{word} BEFORE UPDATE ON words
         WHEN NEW.word = '{word}'
         BEGIN SELECT RAISE(ABORT, 'forced failure'); END;"
    ))
    .expect("install fault trigger");
}

pub fn remove_fault_trigger(path: &Path, word: &str) {
    let conn = open_read_write(path);
    conn.execute_batch(&format!(
        "DROP TRIGGER IF EXISTS fail_insert_{word};
         DROP TRIGGER IF EXISTS fail_update_{word};"
    ))
    .expect("remove fault trigger");
}

/// Every row as `(word, count)`, in word order.
pub fn read_counts(conn: &Connection) -> Vec<(String, u64)> {
    let mut stmt = conn
        .prepare("SELECT word, count FROM words ORDER BY word")
        .unwrap();
    stmt.query_map([], |row| {
        let word: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((word, count as u64))
    })
    .unwrap()
    .collect::<Result<Vec<_>, _>>()
    .unwrap()
}

pub fn count_of(conn: &Connection, word: &str) -> u64 {
    conn.query_row(
        "SELECT count FROM words WHERE word = ?",
        params![word],
        |row| row.get::<_, i64>(0),
    )
    .map(|c| c as u64)
    .unwrap_or(0)
}

pub fn row_id(conn: &Connection, word: &str) -> i64 {
    conn.query_row("SELECT id FROM words WHERE word = ?", params![word], |row| {
        row.get(0)
    })
    .expect("row exists")
}

pub fn counts(pairs: &[(&str, u64)]) -> Vec<(String, u64)> {
    pairs.iter().map(|(w, c)| (w.to_string(), *c)).collect()
}
