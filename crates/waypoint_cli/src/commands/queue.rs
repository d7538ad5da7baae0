//! Queue listing command implementation.

use super::open_store;
use std::path::Path;
use waypoint_core::{QueueEntry, SyncStore};

/// Returns queue entries in drain order, optionally only the failed ones.
pub fn collect(
    path: &Path,
    max_retries: u32,
    failed_only: bool,
    limit: Option<usize>,
) -> Result<Vec<QueueEntry>, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let entries = store
        .queue_snapshot()?
        .into_iter()
        .filter(|entry| !failed_only || entry.is_failed(max_retries))
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    Ok(entries)
}

/// Runs the queue command.
pub fn run(
    path: &Path,
    max_retries: u32,
    failed_only: bool,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = collect(path, max_retries, failed_only, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            if entries.is_empty() {
                println!("Queue is empty.");
                return Ok(());
            }
            println!(
                "{:>6}  {:<8} {:<16} {:<36} {:>7}  {}",
                "Id", "Op", "Table", "Record", "Retries", "Last error"
            );
            for entry in &entries {
                println!(
                    "{:>6}  {:<8} {:<16} {:<36} {:>7}  {}",
                    entry.id,
                    entry.operation,
                    entry.table,
                    entry.record_id,
                    entry.retries,
                    entry.error.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}
