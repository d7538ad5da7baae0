//! Status command implementation.

use super::{format_size, open_store};
use serde::Serialize;
use std::path::Path;
use waypoint_core::{StoreStats, SyncStore};

/// Store status report.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Store path.
    pub path: String,
    /// Entries that used up their retries.
    pub failed_entries: usize,
    /// Cache, queue and journal counters.
    #[serde(flatten)]
    pub stats: StoreStats,
}

/// Builds the status report for the store at `path`.
pub fn collect(path: &Path, max_retries: u32) -> Result<StatusReport, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    Ok(StatusReport {
        path: path.display().to_string(),
        failed_entries: store.failed_count(max_retries)?,
        stats: store.stats()?,
    })
}

/// Runs the status command.
pub fn run(path: &Path, max_retries: u32, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = collect(path, max_retries)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print_text_output(&report),
    }
    Ok(())
}

fn print_text_output(report: &StatusReport) {
    println!("Waypoint Store Status");
    println!("=====================");
    println!();
    println!("Path:    {}", report.path);
    println!("Journal: {}", format_size(report.stats.journal_bytes));
    println!();
    println!("Queue:");
    println!("  Entries: {}", report.stats.queue_len);
    println!("  Failed:  {}", report.failed_entries);
    println!();

    if report.stats.tables.is_empty() {
        println!("No cached records.");
        return;
    }

    println!(
        "{:<20} {:>8} {:>8} {:>8} {:>10}",
        "Table", "Records", "Pending", "Errors", "Tombstones"
    );
    for table in &report.stats.tables {
        println!(
            "{:<20} {:>8} {:>8} {:>8} {:>10}",
            table.table, table.records, table.pending, table.errored, table.tombstones
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::populated_store;

    #[test]
    fn reports_tables_and_failures() {
        let dir = populated_store(3);
        let report = collect(dir.path(), 3).unwrap();

        assert_eq!(report.stats.queue_len, 3);
        assert_eq!(report.failed_entries, 1);
        let tables: Vec<&str> = report.stats.tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(tables, ["expenses", "notes"]);

        let notes = &report.stats.tables[1];
        assert_eq!(notes.records, 2);
        assert_eq!(notes.errored, 1);
        assert_eq!(notes.pending, 1);
    }

    #[test]
    fn json_output_is_flat() {
        let dir = populated_store(3);
        let report = collect(dir.path(), 3).unwrap();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["queue_len"], 3);
        assert_eq!(value["failed_entries"], 1);
    }
}
