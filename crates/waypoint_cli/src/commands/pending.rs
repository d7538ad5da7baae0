//! Pending records command implementation.

use super::open_store;
use std::path::Path;
use waypoint_core::{CachedRecord, SyncObserver};

/// Runs the pending command.
pub fn run(path: &Path, table: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let records = store.get_pending_entities(table)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => print_text_output(table, &records),
    }
    Ok(())
}

fn print_text_output(table: &str, records: &[CachedRecord]) {
    if records.is_empty() {
        println!("No pending records in {table}.");
        return;
    }
    println!("{} pending record(s) in {table}:", records.len());
    for record in records {
        let modified = record
            .locally_modified_at
            .map_or_else(|| "-".to_string(), |at| at.to_rfc3339());
        println!("  {}  modified {}", record.id, modified);
    }
}
