// wordtally command-line front end.
//
// Each invocation opens the database, runs one command, and shuts the
// service down again. Results go to stdout, logs to stderr.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use wordtally::config::DEFAULT_CONFIG_PATH;
use wordtally::{Error, TallyConfig, WordCount, WordTally, SUCCESS_MESSAGE};

/// Exit status for rejected input.
const EXIT_INVALID: u8 = 2;
/// Exit status for internal failures.
const EXIT_INTERNAL: u8 = 1;

/// Heading of the `top` output.
const TOP_MESSAGE: &str = "Top words by count.";

/// Shown for every failure that isn't the caller's fault.
const INTERNAL_MESSAGE: &str = "Internal server error.";

/// CLI entry point wrapper.
#[derive(Parser, Debug)]
#[command(name = "wordtally", version, about = "Count words, all or nothing per batch")]
struct Args {
    /// JSON configuration file. Defaults apply when the default file is absent.
    #[arg(long, env = "WORDTALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overriding the configuration.
    #[arg(long, env = "WORDTALLY_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count a comma-separated list of words as one batch.
    Add {
        /// Words, e.g. `cat,dog,cat`.
        words: String,
    },
    /// Print the most frequent words as JSON.
    Top {
        /// Number of entries (defaults to `top_words_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Body printed by `top`.
#[derive(Serialize)]
struct TopResponse<'a> {
    message: &'a str,
    output: &'a [WordCount],
}

fn render_top(output: &[WordCount]) -> wordtally::Result<String> {
    let body = TopResponse {
        message: TOP_MESSAGE,
        output,
    };
    Ok(serde_json::to_string_pretty(&body)?)
}

/// Validation failures are the caller's; everything else is ours.
fn exit_status(error: &Error) -> u8 {
    if error.is_validation() {
        EXIT_INVALID
    } else {
        EXIT_INTERNAL
    }
}

/// Explicit file first, then `default_path` if it exists, then defaults.
fn load_config(
    explicit: Option<&Path>,
    db: Option<&Path>,
    default_path: &Path,
) -> wordtally::Result<TallyConfig> {
    let mut config = match explicit {
        Some(path) => TallyConfig::load(path)?,
        None if default_path.exists() => TallyConfig::load(default_path)?,
        None => TallyConfig::default(),
    };
    if let Some(db) = db {
        config.database_path = db.to_path_buf();
    }
    Ok(config)
}

/// Runs one command and returns what it prints on stdout.
async fn run(args: Args, default_config: &Path) -> wordtally::Result<String> {
    let config = load_config(args.config.as_deref(), args.db.as_deref(), default_config)?;
    let tally = WordTally::open(config).await?;

    let result = match args.cmd {
        Command::Add { words } => tally.add_words(&words).await.map(|receipt| {
            tracing::debug!(
                words = receipt.words,
                increments = receipt.increments,
                "batch accepted"
            );
            SUCCESS_MESSAGE.to_string()
        }),
        Command::Top { limit } => {
            let output = match limit {
                Some(limit) => tally.top_words(limit).await,
                None => tally.top_words_default().await,
            };
            output.and_then(|output| render_top(&output))
        }
    };

    tally.shutdown().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    match run(args, Path::new(DEFAULT_CONFIG_PATH)).await {
        Ok(stdout) => {
            println!("{stdout}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let status = exit_status(&e);
            if status == EXIT_INVALID {
                eprintln!("{e}");
            } else {
                tracing::error!(error = %e, "command failed");
                eprintln!("{INTERNAL_MESSAGE}");
            }
            ExitCode::from(status)
        }
    }
}
