//! Failed entry maintenance commands.

use super::open_store;
use std::path::Path;
use waypoint_core::SyncStore;

/// Resets every permanently failed entry so the next drain attempts it.
pub fn retry_failed(path: &Path, max_retries: u32) -> Result<usize, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let reset = store.retry_failed(max_retries)?;
    tracing::info!(reset, "re-queued failed sync entries");
    println!("Re-queued {reset} failed entr{}", if reset == 1 { "y" } else { "ies" });
    Ok(reset)
}

/// Drops every permanently failed entry. Affected records keep their error.
pub fn clear_failed(path: &Path, max_retries: u32) -> Result<usize, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let cleared = store.clear_failed(max_retries)?;
    tracing::info!(cleared, "cleared failed sync entries");
    println!("Cleared {cleared} failed entr{}", if cleared == 1 { "y" } else { "ies" });
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::populated_store;
    use waypoint_core::{LocalCache, RecordId, SyncStatus};

    #[test]
    fn retry_restores_pending() {
        let dir = populated_store(3);
        assert_eq!(retry_failed(dir.path(), 3).unwrap(), 1);

        let store = open_store(dir.path()).unwrap();
        assert_eq!(store.failed_count(3).unwrap(), 0);
        let record = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn clear_keeps_error_status() {
        let dir = populated_store(3);
        assert_eq!(clear_failed(dir.path(), 3).unwrap(), 1);

        let store = open_store(dir.path()).unwrap();
        assert_eq!(store.queue_len().unwrap(), 2);
        let record = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Error);
    }
}
