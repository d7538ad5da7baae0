//! Read-side sync state for UI layers.

use crate::cache::SyncStore;
use crate::error::CoreResult;
use crate::record::CachedRecord;
use crate::types::{RecordId, SyncStatus};

/// Lets presentation code show per-record sync indicators.
///
/// Implemented for every [`SyncStore`]; observers poll rather than
/// subscribe.
pub trait SyncObserver {
    /// Returns true if the record has a local change not yet acknowledged by
    /// the remote store.
    fn is_pending_sync(&self, table: &str, id: &RecordId) -> CoreResult<bool>;

    /// Returns live records of `table` that are waiting to sync.
    fn get_pending_entities(&self, table: &str) -> CoreResult<Vec<CachedRecord>>;

    /// Returns the sync status of a record, if cached.
    fn sync_status(&self, table: &str, id: &RecordId) -> CoreResult<Option<SyncStatus>>;
}

impl<S: SyncStore + ?Sized> SyncObserver for S {
    fn is_pending_sync(&self, table: &str, id: &RecordId) -> CoreResult<bool> {
        Ok(self.get(table, id)?.is_some_and(|r| r.is_pending()))
    }

    fn get_pending_entities(&self, table: &str) -> CoreResult<Vec<CachedRecord>> {
        let mut records = self.records_with_status(table, SyncStatus::Pending)?;
        records.retain(CachedRecord::is_live);
        Ok(records)
    }

    fn sync_status(&self, table: &str, id: &RecordId) -> CoreResult<Option<SyncStatus>> {
        Ok(self.get(table, id)?.map(|r| r.sync_status))
    }
}
