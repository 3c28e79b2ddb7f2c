//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Uniform blob-storage CLI over s3, alioss, azurebs, gcs and file backends.
//!
//! Examples:
//! ```bash
//! blob-cli -s s3 -c s3.json put ./release.tgz releases/v1.tgz
//! blob-cli -s s3 -c s3.json exists releases/v1.tgz         # exit 3 when absent
//! blob-cli -s gcs -c gcs.json sign releases/v1.tgz get 15m
//! blob-cli -s azurebs -c az.json list releases/
//! blob-cli -s file -c file.json properties releases/v1.tgz
//! blob-cli -s alioss -c oss.json ensure-bucket-exists
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use blobctl::config::{StorageConfig, StorageType};
use blobctl::constants::ENV_LOG_FILTER;
use blobctl::dispatch::{EXIT_FAILURE, Operation, dispatch};
use blobctl::object_store::store_for_config;
use blobctl::signing::{SignMethod, parse_expiry};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Storage backend the config file describes
    #[arg(short = 's', long = "storage-type", value_enum)]
    storage_type: StorageType,

    /// Backend config file (JSON)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: PathBuf,

    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug, -vvv = Trace",
    )]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a local file to a key.
    Put { src_file: PathBuf, dest_key: String },

    /// Download a key to a local file.
    Get { src_key: String, dest_file: PathBuf },

    /// Delete one key (succeeds when absent).
    Delete { key: String },

    /// Delete every key under a prefix, best effort.
    DeleteRecursive {
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Copy a key to another key in the same bucket.
    Copy { src_key: String, dest_key: String },

    /// Exit 0 if the key exists, 3 if it does not.
    Exists { key: String },

    /// Print a pre-signed URL for GET or PUT, e.g. `sign key get 60s`.
    Sign {
        key: String,
        #[arg(value_enum, ignore_case = true)]
        method: SignMethod,
        #[arg(value_parser = parse_duration_arg)]
        expiration: Duration,
    },

    /// Print every key under a prefix, one per line.
    List {
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Print etag, last_modified and content_length as JSON (`{}` when absent).
    Properties { key: String },

    /// Create the configured bucket/container if it does not exist.
    EnsureBucketExists,
}

impl From<Command> for Operation {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::Put { src_file, dest_key } => Operation::Put { src: src_file, key: dest_key },
            Command::Get { src_key, dest_file } => Operation::Get { key: src_key, dest: dest_file },
            Command::Delete { key } => Operation::Delete { key },
            Command::DeleteRecursive { prefix } => Operation::DeleteRecursive { prefix },
            Command::Copy { src_key, dest_key } => Operation::Copy { src_key, dst_key: dest_key },
            Command::Exists { key } => Operation::Exists { key },
            Command::Sign { key, method, expiration } => Operation::Sign { key, method, expiry: expiration },
            Command::List { prefix } => Operation::List { prefix },
            Command::Properties { key } => Operation::Properties { key },
            Command::EnsureBucketExists => Operation::EnsureBucketExists,
        }
    }
}

fn parse_duration_arg(raw: &str) -> std::result::Result<Duration, String> {
    parse_expiry(raw).map_err(|e| e.to_string())
}

fn load_config(storage_type: StorageType, path: &PathBuf) -> Result<StorageConfig> {
    let file = File::open(path).with_context(|| format!("failed to open config file {}", path.display()))?;
    StorageConfig::from_reader(storage_type, file)
        .with_context(|| format!("invalid {} config {}", storage_type.as_str(), path.display()))
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "warn",  // no -v: WARN level
        1 => "info",  // -v: INFO level
        2 => "debug", // -vv: DEBUG level
        _ => "trace", // -vvv: SDK wire traces too
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env(ENV_LOG_FILTER).unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    // Usage errors exit 1 like every other failure; help/version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { EXIT_FAILURE } else { 0 });
        }
    };
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{:#}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.storage_type, &cli.config)?;
    let store = store_for_config(config)
        .await
        .with_context(|| format!("failed to initialize {} storage", cli.storage_type.as_str()))?;
    debug!("{} storage ready for bucket '{}'", store.backend_name(), store.container());

    let op = Operation::from(cli.cmd);
    let outcome = dispatch(store.as_ref(), &op, &mut io::stdout()).await;

    if let Some(line) = &outcome.diagnostic {
        eprintln!("{}", line);
    }
    Ok(outcome.exit_code)
}
