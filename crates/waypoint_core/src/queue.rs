//! The sync queue: pending remote operations, deduplicated per record.
//!
//! # Invariants
//!
//! - At most one entry exists per `(table, record_id)`
//! - Entry ids are monotonic and never reused
//! - Iteration order is entry id order, i.e. the position at which a record
//!   first entered the queue
//!
//! The merge rule in [`merge_operations`] is what keeps the first invariant:
//! any number of offline edits on one record collapse into the single
//! operation that takes the remote store to the final local state.

use crate::types::{Fields, QueueEntryId, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Remote operation carried by a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create the record remotely.
    Insert,
    /// Overwrite the remote record with the payload.
    Update,
    /// Remove the remote record.
    Delete,
}

impl Operation {
    /// Returns the lowercase operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending remote operation on one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Queue-assigned id (FIFO position).
    pub id: QueueEntryId,
    /// When the entry was created or last merged.
    pub timestamp: Timestamp,
    /// Target table.
    pub table: String,
    /// Operation to perform.
    pub operation: Operation,
    /// Target record.
    pub record_id: RecordId,
    /// Full record payload for inserts and updates.
    pub payload: Option<Fields>,
    /// Failed attempts so far.
    pub retries: u32,
    /// Last failure message.
    pub error: Option<String>,
}

impl QueueEntry {
    /// Returns true once the entry has used up its retry budget.
    #[must_use]
    pub fn is_failed(&self, max_retries: u32) -> bool {
        self.retries >= max_retries
    }

    /// Counts a failed attempt.
    ///
    /// Non-retryable failures exhaust the retry budget immediately so the
    /// entry shows up as failed.
    pub fn register_failure(&mut self, error: impl Into<String>, retryable: bool, max_retries: u32) {
        self.retries = self.retries.saturating_add(1);
        if !retryable {
            self.retries = self.retries.max(max_retries);
        }
        self.error = Some(error.into());
    }

    /// Clears failure state so the entry is drained again.
    pub fn reset_retries(&mut self) {
        self.retries = 0;
        self.error = None;
    }
}

/// A request to enqueue (or merge) an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueRequest {
    /// Target table.
    pub table: String,
    /// Operation to perform.
    pub operation: Operation,
    /// Target record.
    pub record_id: RecordId,
    /// Full record payload; `None` for deletes.
    pub payload: Option<Fields>,
}

impl EnqueueRequest {
    /// Builds an insert request.
    pub fn insert(table: impl Into<String>, record_id: RecordId, payload: Fields) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Insert,
            record_id,
            payload: Some(payload),
        }
    }

    /// Builds an update request.
    pub fn update(table: impl Into<String>, record_id: RecordId, payload: Fields) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Update,
            record_id,
            payload: Some(payload),
        }
    }

    /// Builds a delete request.
    pub fn delete(table: impl Into<String>, record_id: RecordId) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Delete,
            record_id,
            payload: None,
        }
    }
}

/// Result of merging an incoming operation into an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Drop the existing entry; the two operations cancel out.
    Cancel,
    /// Keep one entry carrying this operation.
    Merge(Operation),
}

/// Combines a queued operation with a newer one on the same record.
#[must_use]
pub fn merge_operations(existing: Operation, incoming: Operation) -> MergeDecision {
    use Operation::{Delete, Insert, Update};

    match (existing, incoming) {
        // Created and destroyed offline: the remote never needs to know.
        (Insert, Delete) => MergeDecision::Cancel,
        (Insert, Insert | Update) => MergeDecision::Merge(Insert),
        (Update, Insert | Update) => MergeDecision::Merge(Update),
        (Update, Delete) => MergeDecision::Merge(Delete),
        // Same id recreated after a delete: the remote row still exists.
        (Delete, Insert) => MergeDecision::Merge(Update),
        (Delete, Update | Delete) => MergeDecision::Merge(Delete),
    }
}

/// What [`SyncQueue::enqueue`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A new entry was appended.
    Inserted(QueueEntry),
    /// An existing entry absorbed the request.
    Merged(QueueEntry),
    /// The existing entry was removed; nothing remains queued for the record.
    Cancelled(QueueEntry),
}

impl EnqueueOutcome {
    /// Returns the surviving entry, if any.
    #[must_use]
    pub fn entry(&self) -> Option<&QueueEntry> {
        match self {
            Self::Inserted(entry) | Self::Merged(entry) => Some(entry),
            Self::Cancelled(_) => None,
        }
    }

    /// Returns true if the request cancelled a queued insert.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// In-memory queue state with its `(table, record_id)` index.
///
/// Durability is provided by the owning [`crate::LocalStore`], which journals
/// every change made here.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    entries: BTreeMap<QueueEntryId, QueueEntry>,
    by_record: HashMap<(String, RecordId), QueueEntryId>,
    next_id: u64,
}

impl Default for SyncQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            by_record: HashMap::new(),
            next_id: 1,
        }
    }

    /// Appends `request`, or merges it into the record's existing entry.
    pub fn enqueue(&mut self, request: EnqueueRequest, now: Timestamp) -> EnqueueOutcome {
        let outcome = self.plan(request, now);
        self.apply(&outcome);
        outcome
    }

    /// Computes what [`SyncQueue::enqueue`] would do without changing the
    /// queue.
    ///
    /// The store journals the planned outcome before applying it.
    #[must_use]
    pub fn plan(&self, request: EnqueueRequest, now: Timestamp) -> EnqueueOutcome {
        let Some(existing) = self.find(&request.table, &request.record_id) else {
            return EnqueueOutcome::Inserted(QueueEntry {
                id: QueueEntryId(self.next_id),
                timestamp: now,
                table: request.table,
                operation: request.operation,
                record_id: request.record_id,
                payload: request.payload,
                retries: 0,
                error: None,
            });
        };

        match merge_operations(existing.operation, request.operation) {
            MergeDecision::Cancel => EnqueueOutcome::Cancelled(existing.clone()),
            MergeDecision::Merge(operation) => {
                let mut merged = existing.clone();
                merged.operation = operation;
                if operation == Operation::Delete {
                    merged.payload = None;
                } else if request.payload.is_some() {
                    merged.payload = request.payload;
                }
                merged.reset_retries();
                merged.timestamp = now;
                EnqueueOutcome::Merged(merged)
            }
        }
    }

    /// Applies a planned outcome.
    pub fn apply(&mut self, outcome: &EnqueueOutcome) {
        match outcome {
            EnqueueOutcome::Inserted(entry) | EnqueueOutcome::Merged(entry) => {
                self.put(entry.clone());
            }
            EnqueueOutcome::Cancelled(entry) => {
                self.remove(entry.id);
            }
        }
    }

    /// Looks up an entry by id.
    #[must_use]
    pub fn get(&self, id: QueueEntryId) -> Option<&QueueEntry> {
        self.entries.get(&id)
    }

    /// Looks up the entry for a record.
    #[must_use]
    pub fn find(&self, table: &str, record_id: &RecordId) -> Option<&QueueEntry> {
        self.by_record
            .get(&(table.to_owned(), record_id.clone()))
            .and_then(|id| self.entries.get(id))
    }

    /// Iterates over entries in FIFO order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values()
    }

    /// Copies all entries in FIFO order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.values().cloned().collect()
    }

    /// Copies the entries that still have retries left, in FIFO order.
    #[must_use]
    pub fn drainable(&self, max_retries: u32) -> Vec<QueueEntry> {
        self.entries
            .values()
            .filter(|entry| !entry.is_failed(max_retries))
            .cloned()
            .collect()
    }

    /// Removes an entry.
    pub fn remove(&mut self, id: QueueEntryId) -> Option<QueueEntry> {
        let entry = self.entries.remove(&id)?;
        self.by_record
            .remove(&(entry.table.clone(), entry.record_id.clone()));
        Some(entry)
    }

    /// Stores `entry` under its own id, replacing any previous version and
    /// any other entry for the same record.
    ///
    /// Also used when replaying the journal, so it advances the id counter.
    pub fn put(&mut self, entry: QueueEntry) {
        let key = (entry.table.clone(), entry.record_id.clone());
        if let Some(previous) = self.by_record.insert(key, entry.id) {
            if previous != entry.id {
                self.entries.remove(&previous);
            }
        }
        self.next_id = self.next_id.max(entry.id.as_u64() + 1);
        self.entries.insert(entry.id, entry);
    }

    /// Records a failed attempt on an entry and returns its new state.
    pub fn record_failure(
        &mut self,
        id: QueueEntryId,
        error: impl Into<String>,
        retryable: bool,
        max_retries: u32,
    ) -> Option<QueueEntry> {
        let entry = self.entries.get_mut(&id)?;
        entry.register_failure(error, retryable, max_retries);
        Some(entry.clone())
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that used up their retries.
    #[must_use]
    pub fn failed_count(&self, max_retries: u32) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.is_failed(max_retries))
            .count()
    }

    /// Entries that used up their retries, in FIFO order.
    #[must_use]
    pub fn failed(&self, max_retries: u32) -> Vec<&QueueEntry> {
        self.entries
            .values()
            .filter(|entry| entry.is_failed(max_retries))
            .collect()
    }

    /// The id the next new entry will get.
    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Raises the id counter (never lowers it).
    pub fn advance_next_id(&mut self, next_id: u64) {
        self.next_id = self.next_id.max(next_id);
    }
}
