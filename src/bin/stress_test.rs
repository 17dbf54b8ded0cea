//! wordtally Stress Test Binary
//!
//! A standalone binary for stress testing the tally engine under high
//! concurrency. Run with: `cargo run --bin stress_test -- [OPTIONS]`
//!
//! This is separate from the regular test suite because:
//! 1. It can take a long time to run
//! 2. It's configurable via command-line arguments
//! 3. It reports detailed metrics
//!
//! # Examples
//!
//! ```bash
//! # Default test: 50 words, 1000 batches of 5 words, 10 concurrent tasks
//! cargo run --release --bin stress_test
//!
//! # Heavy overlap: tiny vocabulary, many tasks
//! cargo run --release --bin stress_test -- --words 3 --batches 5000 --concurrency 50
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use wordtally::{reader, Batch, Database, TallyConfig, Word, WordTally};

/// Stress test configuration
struct Config {
    /// Size of the shared vocabulary
    num_words: usize,
    /// Total number of batches to submit
    num_batches: usize,
    /// Tokens per batch (duplicates allowed)
    batch_size: usize,
    /// Number of concurrent submitting tasks
    concurrency: usize,
    /// Path to database file (or temp if None)
    db_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_words: 50,
            num_batches: 1000,
            batch_size: 5,
            concurrency: 10,
            db_path: None,
        }
    }
}

const USAGE: &str = r#"wordtally Stress Test

Usage: stress_test [OPTIONS]

Options:
  -w, --words <N>       Vocabulary size (default: 50)
  -b, --batches <N>     Total batches to submit (default: 1000)
  -n, --batch-size <N>  Tokens per batch (default: 5)
  -c, --concurrency <N> Concurrent submitting tasks (default: 10)
  -d, --db <PATH>       Database path (default: temp file)
  -h, --help            Show this help
"#;

/// Parses `args` (program name first). `Ok(None)` means help was requested.
fn parse_args(args: &[String]) -> Result<Option<Config>, String> {
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--words" | "-w" => {
                i += 1;
                config.num_words = positive(args, i, flag)?;
            }
            "--batches" | "-b" => {
                i += 1;
                config.num_batches = value(args, i, flag)?;
            }
            "--batch-size" | "-n" => {
                i += 1;
                config.batch_size = positive(args, i, flag)?;
            }
            "--concurrency" | "-c" => {
                i += 1;
                config.concurrency = positive(args, i, flag)?;
            }
            "--db" | "-d" => {
                i += 1;
                config.db_path = Some(value(args, i, flag)?);
            }
            "--help" | "-h" => return Ok(None),
            arg => return Err(format!("Unknown argument: {}", arg)),
        }
        i += 1;
    }

    Ok(Some(config))
}

fn value<T: FromStr>(args: &[String], i: usize, flag: &str) -> Result<T, String> {
    let raw = args
        .get(i)
        .ok_or_else(|| format!("Missing value for {}", flag))?;
    raw.parse()
        .map_err(|_| format!("Invalid {} value: {}", flag, raw))
}

fn positive(args: &[String], i: usize, flag: &str) -> Result<usize, String> {
    match value::<usize>(args, i, flag)? {
        0 => Err(format!("{} must be at least 1", flag)),
        n => Ok(n),
    }
}

/// Batches submitted by task `task_id`; the remainder goes to the first tasks.
fn batches_for_task(config: &Config, task_id: usize) -> usize {
    config.num_batches / config.concurrency
        + usize::from(task_id < config.num_batches % config.concurrency)
}

/// Letters-only name for vocabulary entry `n` ("a", "b", ..., "ba", ...).
fn word_name(mut n: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'a' + (n % 26) as u8);
        n /= 26;
        if n == 0 {
            break;
        }
    }
    letters.reverse();
    String::from_utf8(letters).expect("ascii letters")
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args) {
        Ok(Some(config)) => config,
        Ok(None) => {
            println!("{}", USAGE);
            return;
        }
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Run with --help for usage.");
            std::process::exit(1);
        }
    };

    println!("wordtally Stress Test");
    println!("=====================");
    println!("Words:       {}", config.num_words);
    println!("Batches:     {}", config.num_batches);
    println!("Batch size:  {}", config.batch_size);
    println!("Concurrency: {}", config.concurrency);
    println!();

    let temp_dir = std::env::temp_dir().join(format!("wordtally-stress-{}", std::process::id()));
    std::fs::create_dir_all(&temp_dir).expect("create temp dir");
    let db_path = config
        .db_path
        .clone()
        .unwrap_or_else(|| temp_dir.join("stress.db").to_string_lossy().to_string());

    println!("Database:    {}", db_path);
    println!();

    let before = {
        let db = Database::open(&db_path).expect("open database");
        reader::total_count(db.connection()).unwrap()
    };

    let tally = WordTally::open(TallyConfig::with_database(&db_path))
        .await
        .expect("open wordtally");

    // Metrics
    let committed = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let expected: Arc<Mutex<HashMap<Word, u64>>> = Arc::new(Mutex::new(HashMap::new()));

    println!("Starting stress test...");
    let start = Instant::now();

    let mut handles = Vec::new();
    for task_id in 0..config.concurrency {
        let tally = tally.clone();
        let committed = committed.clone();
        let failed = failed.clone();
        let expected = expected.clone();
        let num_words = config.num_words;
        let batch_size = config.batch_size;
        let concurrency = config.concurrency;
        let batches = batches_for_task(&config, task_id);

        let handle = tokio::spawn(async move {
            for i in 0..batches {
                let seed = i * concurrency + task_id;
                let tokens: Vec<String> = (0..batch_size)
                    .map(|k| word_name((seed * 7 + k * 3) % num_words))
                    .collect();
                let batch = Batch::from_tokens(&tokens);

                match tally.apply(batch.clone()).await {
                    Ok(_receipt) => {
                        committed.fetch_add(1, Ordering::Relaxed);
                        let mut expected = expected.lock().unwrap();
                        for (word, increment) in batch {
                            *expected.entry(word).or_insert(0) += increment;
                        }
                    }
                    Err(_) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let elapsed = start.elapsed();
    tally.shutdown().await;

    let committed = committed.load(Ordering::Relaxed);
    let failed = failed.load(Ordering::Relaxed);

    println!();
    println!("Results");
    println!("-------");
    println!("Batches committed: {}", committed);
    println!("Batches failed:    {}", failed);
    println!("Duration:          {:?}", elapsed);
    println!(
        "Throughput:        {:.2} batches/sec",
        committed as f64 / elapsed.as_secs_f64()
    );
    println!();

    // Verify invariants
    println!("Verifying invariants...");

    let read_conn =
        rusqlite::Connection::open_with_flags(&db_path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .unwrap();

    let expected = expected.lock().unwrap();
    let expected_total: u64 = expected.values().sum();
    let total = reader::total_count(&read_conn).unwrap() - before;
    println!("  Increments in database: {}", total);
    assert_eq!(
        total, expected_total,
        "Total mismatch: {} in DB, {} committed",
        total, expected_total
    );

    if before == 0 {
        for (word, count) in expected.iter() {
            let stored = reader::get_count(&read_conn, word).unwrap();
            assert_eq!(stored, *count, "Count mismatch for '{}'", word);
        }
        println!("  Per-word counts:   match across {} words ✓", expected.len());
    }

    let rows: i64 = read_conn
        .query_row("SELECT COUNT(*) FROM words", [], |row| row.get(0))
        .unwrap();
    let distinct: i64 = read_conn
        .query_row("SELECT COUNT(DISTINCT word) FROM words", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, distinct, "Duplicate rows for a word");
    println!("  One row per word:  {} rows ✓", rows);

    println!();
    println!("Stress test PASSED ✓");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(rest: &[&str]) -> Vec<String> {
        std::iter::once("stress_test")
            .chain(rest.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args_defaults_and_flags() {
        let config = parse_args(&argv(&[])).unwrap().unwrap();
        assert_eq!(config.num_words, 50);
        assert_eq!(config.concurrency, 10);

        let config = parse_args(&argv(&["-w", "3", "--batches", "7", "-c", "2", "-d", "x.db"]))
            .unwrap()
            .unwrap();
        assert_eq!(config.num_words, 3);
        assert_eq!(config.num_batches, 7);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.db_path.as_deref(), Some("x.db"));

        assert!(parse_args(&argv(&["--help"])).unwrap().is_none());
    }

    #[test]
    fn test_parse_args_rejects_zero_and_missing_values() {
        for flag in ["--words", "--batch-size", "--concurrency"] {
            let err = parse_args(&argv(&[flag, "0"])).err().unwrap();
            assert!(err.contains("at least 1"), "{err}");

            let err = parse_args(&argv(&[flag])).err().unwrap();
            assert!(err.starts_with("Missing value"), "{err}");
        }

        let err = parse_args(&argv(&["--batches", "many"])).err().unwrap();
        assert!(err.starts_with("Invalid --batches"), "{err}");

        let err = parse_args(&argv(&["--fast"])).err().unwrap();
        assert!(err.starts_with("Unknown argument"), "{err}");
    }

    #[test]
    fn test_batches_are_spread_over_tasks() {
        let config = Config {
            num_batches: 7,
            concurrency: 3,
            ..Config::default()
        };
        let per_task: Vec<usize> = (0..3).map(|t| batches_for_task(&config, t)).collect();
        assert_eq!(per_task, vec![3, 2, 2]);

        let config = Config {
            num_batches: 2,
            concurrency: 5,
            ..Config::default()
        };
        let total: usize = (0..5).map(|t| batches_for_task(&config, t)).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_word_names_are_letters() {
        assert_eq!(word_name(0), "a");
        assert_eq!(word_name(25), "z");
        assert_eq!(word_name(26), "ba");
    }
}
