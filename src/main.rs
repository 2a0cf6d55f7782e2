//! Gallery Cache - resumable metadata index builder for WebDAV photo galleries
//!
//! Walks a gallery folder on a WebDAV server and builds a local metadata
//! cache in small, resumable batches.

mod cache;
mod extract;
mod remote;

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

use cache::manager::BatchStatus;
use cache::{CacheManager, CacheStore};
use remote::DavClient;

/// CLI command
#[derive(Debug)]
enum Command {
    /// Start a new cache run over a gallery folder
    Init { folder: String },
    /// Process one batch of the pending list
    Batch { offset: Option<usize> },
    /// Drive batches until the run completes
    Run { folder: Option<String> },
    /// Show run state and progress (default)
    Status,
    /// Stop the current run
    Cancel,
    /// Print the browsable metadata records
    List,
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"Gallery Cache - Build a browsable metadata index for a WebDAV photo gallery

USAGE:
    gallery-cache                        # Show run status (default)
    gallery-cache init <folder>
    gallery-cache batch [offset]
    gallery-cache run [folder]
    gallery-cache status
    gallery-cache cancel
    gallery-cache list
    gallery-cache help

COMMANDS:
    init    Enumerate <folder> on the WebDAV server and start a new run
    batch   Process the next batch of pending files (offset defaults to
            the number of records already written)
    run     Process batches until the run completes; with <folder>,
            initialize first
    status  Show run state and progress
    cancel  Stop the current run, keeping records written so far
    list    Print the browsable metadata records as JSON lines
    help    Show this help message

EXAMPLES:
    # Build the whole index in one go
    gallery-cache run Photos

    # Or drive it batch by batch (e.g. from cron)
    gallery-cache init Photos
    gallery-cache batch

ENVIRONMENT:
    GALLERY_DAV_URL        Base URL of the WebDAV files root
    GALLERY_DAV_USERNAME   WebDAV user
    GALLERY_DAV_PASSWORD   WebDAV password
    GALLERY_CACHE_DIR      Cache directory (defaults to the user cache dir)
    RUST_LOG               Log level (trace, debug, info, warn, error)

NOTE:
    init discards the previous run and its records for this cache directory.
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Status);
    }

    match args[1].as_str() {
        "init" => {
            if args.len() < 3 {
                return Err(anyhow!("Usage: gallery-cache init <folder>"));
            }
            Ok(Command::Init {
                folder: args[2].clone(),
            })
        }
        "batch" => {
            let offset = match args.get(2) {
                Some(raw) => Some(
                    raw.parse()
                        .map_err(|_| anyhow!("Offset must be a number, got: {}", raw))?,
                ),
                None => None,
            };
            Ok(Command::Batch { offset })
        }
        "run" => Ok(Command::Run {
            folder: args.get(2).cloned(),
        }),
        "status" => Ok(Command::Status),
        "cancel" => Ok(Command::Cancel),
        "list" => Ok(Command::List),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

/// Build the WebDAV client from the environment
fn env_client() -> Result<DavClient> {
    let base_url =
        env::var("GALLERY_DAV_URL").map_err(|_| anyhow!("GALLERY_DAV_URL must be set"))?;
    let username = env::var("GALLERY_DAV_USERNAME")
        .map_err(|_| anyhow!("GALLERY_DAV_USERNAME must be set"))?;
    let password = env::var("GALLERY_DAV_PASSWORD")
        .map_err(|_| anyhow!("GALLERY_DAV_PASSWORD must be set"))?;
    Ok(DavClient::new(&base_url, &username, &password)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Open the cache store
    let root = env::var("GALLERY_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| CacheStore::default_root());
    let store = CacheStore::new(&root)
        .with_context(|| format!("Could not open cache directory {}", root.display()))?;
    let manager = CacheManager::new(store);
    debug!(root = %manager.store().root().display(), "Using cache root");

    match command {
        Command::Init { folder } => {
            let client = env_client()?;
            let outcome = match manager.init(&client, &folder).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Init failed");
                    return Err(e.into());
                }
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Batch { offset } => {
            let client = env_client()?;
            let offset = match offset {
                Some(offset) => offset,
                None => manager.status()?.processed,
            };
            let outcome = manager.process_batch(&client, offset).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Run { folder } => {
            let client = env_client()?;
            if let Some(folder) = &folder {
                let outcome = manager.init(&client, folder).await?;
                info!(total = outcome.total, "Initialized, processing to completion");
            } else if manager.store().pending_exists() {
                info!("Resuming existing cache run");
            }

            // Feed each batch's processed count back as the next offset
            let mut offset = manager.status()?.processed;
            loop {
                let outcome = manager.process_batch(&client, offset).await?;
                match outcome.status {
                    BatchStatus::Caching => offset = outcome.processed,
                    BatchStatus::Complete | BatchStatus::Idle => {
                        if let Some(message) = &outcome.message {
                            eprintln!("{}", message);
                        }
                        println!("{}", serde_json::to_string_pretty(&outcome)?);
                        break;
                    }
                }
            }
        }
        Command::Status => {
            let status = manager.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Cancel => {
            let outcome = manager.cancel()?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::List => {
            let records = manager.store().read_records()?;
            if records.is_empty() {
                println!("No cached metadata.");
            } else {
                for record in records {
                    println!("{}", serde_json::to_string(&record)?);
                }
            }
        }
        Command::Help => {
            print_help();
        }
    }

    Ok(())
}
