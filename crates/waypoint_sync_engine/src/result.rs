//! Drain outcomes.

use crate::classify::ErrorKind;
use std::time::Duration;
use waypoint_core::{Operation, QueueEntryId, RecordId, Timestamp};

/// One entry that failed during a drain.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncErrorDetail {
    /// Failed queue entry.
    pub queue_entry_id: QueueEntryId,
    /// Table of the record.
    pub table: String,
    /// Record id.
    pub record_id: RecordId,
    /// Operation that failed.
    pub operation: Operation,
    /// Remote error message.
    pub error: String,
    /// Classification of the error.
    pub error_kind: ErrorKind,
    /// Whether the entry will be attempted again.
    pub retryable: bool,
}

/// A remote record that changed after the local edit it was overwritten
/// with. Last write wins; this is only a report.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
    /// Table of the record.
    pub table: String,
    /// Record id.
    pub record_id: RecordId,
    /// When the local change was queued.
    pub local_timestamp: Timestamp,
    /// Remote last-modified time.
    pub remote_timestamp: Timestamp,
}

/// Aggregated outcome of one drain.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult {
    /// True if the drain ran and every entry synced.
    pub success: bool,
    /// Entries synced.
    pub processed_count: usize,
    /// Entries that failed.
    pub error_count: usize,
    /// Per-entry failures, in drain order.
    pub errors: Vec<SyncErrorDetail>,
    /// Overwritten remote changes.
    pub conflicts: Vec<ConflictRecord>,
    /// Wall time of the drain.
    pub duration: Duration,
}

impl SyncResult {
    pub(crate) fn empty() -> Self {
        Self {
            success: true,
            processed_count: 0,
            error_count: 0,
            errors: Vec::new(),
            conflicts: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Result of a drain that did not run because another was in flight.
    pub(crate) fn skipped() -> Self {
        Self {
            success: false,
            ..Self::empty()
        }
    }

    /// Returns true if this result comes from a drain that was skipped.
    #[must_use]
    pub fn was_skipped(&self) -> bool {
        !self.success && self.processed_count == 0 && self.error_count == 0
    }
}
