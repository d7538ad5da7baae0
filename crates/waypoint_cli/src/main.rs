//! Waypoint CLI
//!
//! Command-line tools for inspecting and maintaining a Waypoint local store.
//!
//! # Commands
//!
//! - `status` - Display per-table sync status and queue counters
//! - `queue` - List pending sync queue entries
//! - `pending` - List records of a table waiting to sync
//! - `retry-failed` - Give permanently failed entries a fresh retry budget
//! - `clear-failed` - Abandon permanently failed entries
//! - `compact` - Rewrite the journal as a single checkpoint
//! - `verify` - Check journal frames without opening the store

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default retry budget, matching the sync engine's default.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Waypoint local store tools.
#[derive(Parser)]
#[command(name = "waypoint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Retry budget used to decide which entries have failed
    #[arg(global = true, long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display per-table sync status and queue counters
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List sync queue entries in drain order
    Queue {
        /// Only show entries that used up their retries
        #[arg(long)]
        failed: bool,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List live records of a table waiting to sync
    Pending {
        /// Table to list
        #[arg(short, long)]
        table: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Give permanently failed entries a fresh retry budget
    RetryFailed,

    /// Abandon permanently failed entries; their records keep the error status
    ClearFailed,

    /// Rewrite the journal as a single checkpoint frame
    Compact,

    /// Check journal frames without opening the store
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let max_retries = cli.max_retries;
    match cli.command {
        Commands::Status { format } => {
            let path = cli.path.ok_or("Store path required for status")?;
            commands::status::run(&path, max_retries, &format)?;
        }
        Commands::Queue {
            failed,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for queue")?;
            commands::queue::run(&path, max_retries, failed, limit, &format)?;
        }
        Commands::Pending { table, format } => {
            let path = cli.path.ok_or("Store path required for pending")?;
            commands::pending::run(&path, &table, &format)?;
        }
        Commands::RetryFailed => {
            let path = cli.path.ok_or("Store path required for retry-failed")?;
            commands::maintenance::retry_failed(&path, max_retries)?;
        }
        Commands::ClearFailed => {
            let path = cli.path.ok_or("Store path required for clear-failed")?;
            commands::maintenance::clear_failed(&path, max_retries)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Version => {
            println!("Waypoint CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Waypoint Core v{}", waypoint_core::VERSION);
        }
    }

    Ok(())
}
