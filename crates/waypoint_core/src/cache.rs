//! Storage contracts for the local cache and the sync queue.
//!
//! [`LocalCache`] is a plain table-partitioned key-value store with no
//! business logic. [`SyncStore`] adds the queue and the few compound
//! operations that must touch a record and its queue entry atomically, so
//! that every pending record keeps exactly one queue entry.

use crate::error::CoreResult;
use crate::queue::{EnqueueOutcome, EnqueueRequest, QueueEntry};
use crate::record::CachedRecord;
use crate::types::{RecordId, SyncStatus, Timestamp};
use serde_json::Value;

/// Client-resident store of the believed current state of every entity.
///
/// Storage errors are returned to the caller; a write is never dropped
/// silently.
pub trait LocalCache: Send + Sync {
    /// Reads a record, including local tombstones.
    fn get(&self, table: &str, id: &RecordId) -> CoreResult<Option<CachedRecord>>;

    /// Inserts or overwrites a record.
    fn put(&self, record: CachedRecord) -> CoreResult<()>;

    /// Removes a record. Returns whether it existed.
    fn delete(&self, table: &str, id: &RecordId) -> CoreResult<bool>;

    /// Returns every record of `table` (tombstones included) that matches
    /// `predicate`, ordered by id.
    fn query(
        &self,
        table: &str,
        predicate: &dyn Fn(&CachedRecord) -> bool,
    ) -> CoreResult<Vec<CachedRecord>>;

    /// Returns live records whose declared index `index` equals `key`.
    ///
    /// `key` has one value per indexed field, in declaration order.
    fn query_index(&self, table: &str, index: &str, key: &[Value])
        -> CoreResult<Vec<CachedRecord>>;

    /// Returns records with the given sync status, tombstones included.
    fn records_with_status(&self, table: &str, status: SyncStatus)
        -> CoreResult<Vec<CachedRecord>>;
}

/// Local cache plus sync queue.
pub trait SyncStore: LocalCache {
    /// Writes the optimistic `record` and enqueues `request` as one atomic
    /// change.
    ///
    /// If the request cancels a queued insert, the record is removed instead
    /// of written: it was never seen by the remote.
    fn stage_mutation(
        &self,
        record: CachedRecord,
        request: EnqueueRequest,
    ) -> CoreResult<EnqueueOutcome>;

    /// Returns the queued entry for a record.
    fn queue_entry(&self, table: &str, id: &RecordId) -> CoreResult<Option<QueueEntry>>;

    /// Returns all queued entries in FIFO order.
    fn queue_snapshot(&self) -> CoreResult<Vec<QueueEntry>>;

    /// Returns entries with retries left, in FIFO order.
    fn drainable_entries(&self, max_retries: u32) -> CoreResult<Vec<QueueEntry>>;

    /// Finishes a successfully synced entry.
    ///
    /// Removes the entry and marks its record synced (or removes the record
    /// after a delete). If the record was edited again since `entry` was
    /// snapshotted, the newer entry stays queued and the record stays
    /// pending. Returns whether the entry was removed.
    fn complete_entry(&self, entry: &QueueEntry, now: Timestamp) -> CoreResult<bool>;

    /// Counts a failed attempt on an entry.
    ///
    /// Once the entry runs out of retries its record is marked
    /// [`SyncStatus::Error`]. Returns the updated entry, or `None` if the
    /// entry was replaced or removed since it was snapshotted.
    fn fail_entry(
        &self,
        entry: &QueueEntry,
        error: &str,
        retryable: bool,
        max_retries: u32,
    ) -> CoreResult<Option<QueueEntry>>;

    /// Number of queued entries.
    fn queue_len(&self) -> CoreResult<usize>;

    /// Number of entries that used up their retries.
    fn failed_count(&self, max_retries: u32) -> CoreResult<usize>;

    /// Resets failed entries and puts their records back to pending.
    /// Returns how many were reset.
    fn retry_failed(&self, max_retries: u32) -> CoreResult<usize>;

    /// Abandons failed entries. Their records keep the `Error` status.
    /// Returns how many were removed.
    fn clear_failed(&self, max_retries: u32) -> CoreResult<usize>;
}
