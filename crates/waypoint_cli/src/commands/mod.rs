//! CLI command implementations.

pub mod compact;
pub mod maintenance;
pub mod pending;
pub mod queue;
pub mod status;
pub mod verify;

use std::path::Path;
use waypoint_core::{Config, LocalStore, Schema};

/// Name of the journal file inside a store directory.
pub const JOURNAL_FILE: &str = "journal.log";

/// Opens an existing store for maintenance.
///
/// No indexes are declared: the commands only read records and queue
/// entries. Opening repairs a torn journal tail, like any other open.
pub fn open_store(path: &Path) -> Result<LocalStore, Box<dyn std::error::Error>> {
    let config = Config::default().create_if_missing(false);
    let store = LocalStore::open_with_config(path, Schema::new(), config)?;
    tracing::debug!(path = %path.display(), "opened store");
    Ok(store)
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;
    use waypoint_core::{LocalStore, MutationEnqueuer, RecordId, Schema, SyncStore};

    /// A store with one synced-then-failed note, one pending note and one
    /// pending expense, closed so commands can open it.
    pub fn populated_store(max_retries: u32) -> TempDir {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(dir.path(), Schema::new()).unwrap());
        let enqueuer = MutationEnqueuer::new(Arc::clone(&store));

        enqueuer
            .create("notes", json!({ "id": "n1", "content": "a" }))
            .unwrap();
        enqueuer
            .create("notes", json!({ "id": "n2", "content": "b" }))
            .unwrap();
        enqueuer
            .create("expenses", json!({ "id": "e1", "amount_cents": 100 }))
            .unwrap();

        let entry = store
            .queue_entry("notes", &RecordId::from("n1"))
            .unwrap()
            .unwrap();
        store
            .fail_entry(&entry, "permission denied", false, max_retries)
            .unwrap();
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_store_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(open_store(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(10), "10 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
