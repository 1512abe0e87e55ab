//! rewind CLI - record and play back topic logs
//!
//! Provides the flat command surface as a binary: inspect a log's catalog,
//! replay it onto the fabric, or record fabric traffic into a new log.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use regex::Regex;

use rewind::error::CommandCode;
use rewind::store::{SqliteStore, Store};
use rewind::{diagnostics, ffi, Playback};

/// rewind CLI
#[derive(Parser, Debug)]
#[command(name = "rewind")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Record and play back pub/sub topic logs with their original timing")]
struct Cli {
    /// Verbosity level: 0 silent, 1 errors, 2 warnings, 3 info, 4 debug
    #[arg(long, global = true, env = "REWIND_VERBOSITY", default_value_t = 1)]
    verbosity: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the catalog of topics and message types in a log
    Info {
        /// Path to the log file
        file: PathBuf,

        /// Emit the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a log onto the fabric with its original timing
    Play {
        /// Path to the log file
        file: PathBuf,

        /// Whole-name pattern selecting the topics to replay
        #[arg(long, default_value = ".*")]
        topics: String,

        /// Pause after advertising, before the first publish
        #[arg(long, default_value_t = 0)]
        settle_ms: u64,
    },

    /// Record fabric traffic into a log until SIGINT/SIGTERM
    Record {
        /// Path to the log file to create
        file: PathBuf,

        /// Whole-name pattern selecting the topics to record
        #[arg(long, default_value = ".*")]
        topics: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if diagnostics::set_verbosity(cli.verbosity).is_err() {
        eprintln!("invalid verbosity level: {}", cli.verbosity);
        return ExitCode::from(CommandCode::InvalidVersion as u8);
    }
    diagnostics::init();

    let code = match cli.command {
        Command::Info { file, json } => info(&file, json),
        Command::Play {
            file,
            topics,
            settle_ms,
        } => play(&file, &topics, Duration::from_millis(settle_ms)),
        Command::Record { file, topics } => ffi::record_topics(&file, &topics),
    };

    ExitCode::from(code as u8)
}

fn info(file: &PathBuf, json: bool) -> CommandCode {
    let store = match SqliteStore::open(file) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("could not open log file: {e}");
            return CommandCode::from_error(&e);
        }
    };

    let catalog = store.descriptor();
    if json {
        match serde_json::to_string_pretty(&catalog) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("could not render catalog: {e}");
                return CommandCode::FailedToOpen;
            }
        }
    } else {
        for (topic, types) in catalog.topic_types() {
            for type_name in types {
                println!("{topic}  [{type_name}]");
            }
        }
    }
    CommandCode::Success
}

fn play(file: &PathBuf, topics: &str, settle: Duration) -> CommandCode {
    let pattern = match Regex::new(topics) {
        Ok(re) => re,
        Err(e) => {
            eprintln!("invalid topic pattern: {e}");
            return CommandCode::BadRegex;
        }
    };

    let mut player = Playback::open(file);
    player.add_topics_matching(&pattern);
    let session = match player.start(settle) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("could not start playback: {e}");
            return CommandCode::from_error(&e);
        }
    };

    session.wait_until_finished();
    CommandCode::Success
}
