//! Queue drain and reconciliation.

use crate::classify::classify;
use crate::config::SyncConfig;
use crate::error::{EngineResult, RemoteError};
use crate::remote::{RemoteDataStore, RemoteResult};
use crate::result::{ConflictRecord, SyncErrorDetail, SyncResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use waypoint_core::{Fields, Operation, QueueEntry, SyncStore, Timestamp};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No drain has run yet.
    Idle,
    /// A drain is in flight.
    Draining,
    /// The last drain synced every entry it attempted.
    Synced,
    /// The last drain had failures, or stopped on a storage error.
    Error,
}

impl SyncState {
    /// Returns true while a drain is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Draining)
    }
}

/// Statistics about drains.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Drains that ran to completion.
    pub drains_completed: u64,
    /// Drains skipped because another was in flight.
    pub drains_skipped: u64,
    /// Entries synced.
    pub entries_processed: u64,
    /// Failed entry attempts.
    pub entries_failed: u64,
    /// Conflicts detected on updates.
    pub conflicts_detected: u64,
    /// End of the last completed drain.
    pub last_drain_at: Option<Timestamp>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Releases the processing flag when dropped, including on early return.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drains the sync queue into a remote data store.
///
/// Entries are pushed one at a time in FIFO order. Successes are removed
/// from the queue and their records marked synced; failures are counted
/// against the entry's retry budget. Only one drain runs at a time: a drain
/// requested while another is in flight returns a skipped result
/// immediately.
///
/// ```rust
/// use std::sync::Arc;
/// use serde_json::json;
/// use waypoint_core::{LocalStore, MutationEnqueuer, Schema, SyncStore};
/// use waypoint_sync_engine::{MemoryRemoteStore, SyncConfig, SyncEngine};
///
/// let store = Arc::new(LocalStore::open_in_memory(Schema::new())?);
/// let remote = Arc::new(MemoryRemoteStore::new());
/// let engine = SyncEngine::new(SyncConfig::default(), Arc::clone(&store), Arc::clone(&remote));
///
/// MutationEnqueuer::new(Arc::clone(&store)).create("notes", json!({ "content": "hi" }))?;
/// let result = engine.drain()?;
///
/// assert!(result.success);
/// assert_eq!(remote.len("notes"), 1);
/// assert_eq!(store.queue_len()?, 0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SyncEngine<S: SyncStore, R: RemoteDataStore> {
    config: SyncConfig,
    store: Arc<S>,
    remote: Arc<R>,
    processing: AtomicBool,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<S: SyncStore, R: RemoteDataStore> SyncEngine<S, R> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, store: Arc<S>, remote: Arc<R>) -> Self {
        Self {
            config,
            store,
            remote,
            processing: AtomicBool::new(false),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Gets the remote store.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a drain is in flight.
    pub fn is_draining(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn try_acquire(&self) -> Option<DrainGuard<'_>> {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard {
                flag: &self.processing,
            })
    }

    /// Pushes every drainable queue entry to the remote store.
    ///
    /// Remote failures are reported in the result; only local storage
    /// errors are returned as `Err`.
    pub fn drain(&self) -> EngineResult<SyncResult> {
        let Some(_guard) = self.try_acquire() else {
            tracing::debug!("drain already in progress, skipping");
            self.stats.write().drains_skipped += 1;
            return Ok(SyncResult::skipped());
        };

        let start = Instant::now();
        self.set_state(SyncState::Draining);

        let mut result = match self.drain_entries() {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "drain aborted by local storage error");
                self.set_state(SyncState::Error);
                self.stats.write().last_error = Some(e.to_string());
                return Err(e);
            }
        };
        result.duration = start.elapsed();
        result.success = result.error_count == 0;

        {
            let mut stats = self.stats.write();
            stats.drains_completed += 1;
            stats.entries_processed += result.processed_count as u64;
            stats.entries_failed += result.error_count as u64;
            stats.conflicts_detected += result.conflicts.len() as u64;
            stats.last_drain_at = Some(Utc::now());
            stats.last_error = result.errors.first().map(|e| e.error.clone());
        }
        self.set_state(if result.success {
            SyncState::Synced
        } else {
            SyncState::Error
        });

        Ok(result)
    }

    fn drain_entries(&self) -> EngineResult<SyncResult> {
        let max_retries = self.config.max_retries;
        let entries = self.store.drainable_entries(max_retries)?;
        let mut result = SyncResult::empty();
        if entries.is_empty() {
            return Ok(result);
        }

        tracing::debug!(entries = entries.len(), "draining sync queue");

        for entry in entries {
            match self.push(&entry, &mut result.conflicts) {
                Ok(()) => {
                    self.store.complete_entry(&entry, Utc::now())?;
                    result.processed_count += 1;
                }
                Err(error) => {
                    let detail = self.record_failure(&entry, &error)?;
                    result.error_count += 1;
                    result.errors.push(detail);
                }
            }
        }

        tracing::info!(
            processed = result.processed_count,
            failed = result.error_count,
            conflicts = result.conflicts.len(),
            "sync queue drained"
        );
        Ok(result)
    }

    fn record_failure(
        &self,
        entry: &QueueEntry,
        error: &RemoteError,
    ) -> EngineResult<SyncErrorDetail> {
        let max_retries = self.config.max_retries;
        let kind = classify(error);
        let message = error.to_string();
        let updated = self
            .store
            .fail_entry(entry, &message, kind.is_retryable(), max_retries)?;

        let exhausted = updated.as_ref().is_some_and(|e| e.is_failed(max_retries));
        if exhausted {
            tracing::error!(
                entry = %entry.id,
                table = %entry.table,
                id = %entry.record_id,
                operation = %entry.operation,
                kind = %kind,
                error = %message,
                "sync entry failed permanently"
            );
        } else {
            tracing::warn!(
                entry = %entry.id,
                table = %entry.table,
                id = %entry.record_id,
                operation = %entry.operation,
                kind = %kind,
                retries = updated.as_ref().map_or(entry.retries, |e| e.retries),
                error = %message,
                "sync entry failed"
            );
        }

        Ok(SyncErrorDetail {
            queue_entry_id: entry.id,
            table: entry.table.clone(),
            record_id: entry.record_id.clone(),
            operation: entry.operation,
            error: message,
            error_kind: kind,
            retryable: !exhausted && kind.is_retryable(),
        })
    }

    /// Sends one entry to the remote store.
    fn push(&self, entry: &QueueEntry, conflicts: &mut Vec<ConflictRecord>) -> RemoteResult<()> {
        let table = entry.table.as_str();
        let id = &entry.record_id;

        match entry.operation {
            Operation::Insert => {
                let payload = self.payload(entry)?;
                match self.remote.insert(table, &payload) {
                    Err(RemoteError::DuplicateKey { .. }) => {
                        // An earlier attempt landed; converge by overwriting.
                        tracing::debug!(table, id = %id, "insert hit existing row, updating instead");
                        self.remote.update(table, id, &payload)
                    }
                    other => other,
                }
            }
            Operation::Update => {
                let payload = self.payload(entry)?;
                if let Some(current) = self.remote.fetch(table, id)? {
                    if let Some(conflict) = self.detect_conflict(entry, &current) {
                        tracing::warn!(
                            table,
                            id = %id,
                            local = %conflict.local_timestamp,
                            remote = %conflict.remote_timestamp,
                            "remote record changed after local edit, overwriting (last write wins)"
                        );
                        conflicts.push(conflict);
                    }
                }
                self.remote.update(table, id, &payload)
            }
            Operation::Delete => match self.remote.delete(table, id) {
                Err(RemoteError::NotFound { .. }) => Ok(()),
                other => other,
            },
        }
    }

    fn payload(&self, entry: &QueueEntry) -> RemoteResult<Fields> {
        let payload = entry.payload.clone().ok_or_else(|| {
            RemoteError::other(format!(
                "invalid queue entry {}: {} without payload",
                entry.id, entry.operation
            ))
        })?;
        Ok(self.remote.normalize(&entry.table, payload))
    }

    fn detect_conflict(&self, entry: &QueueEntry, remote: &Fields) -> Option<ConflictRecord> {
        let modified = remote.get(&self.config.modified_at_field)?.as_str()?;
        let remote_timestamp = DateTime::parse_from_rfc3339(modified)
            .ok()?
            .with_timezone(&Utc);
        (remote_timestamp > entry.timestamp).then(|| ConflictRecord {
            table: entry.table.clone(),
            record_id: entry.record_id.clone(),
            local_timestamp: entry.timestamp,
            remote_timestamp,
        })
    }

    /// Number of queued entries, failed ones included.
    pub fn pending_count(&self) -> EngineResult<usize> {
        Ok(self.store.queue_len()?)
    }

    /// Number of entries that used up their retries.
    pub fn failed_count(&self) -> EngineResult<usize> {
        Ok(self.store.failed_count(self.config.max_retries)?)
    }

    /// Abandons permanently failed entries. Their records keep the `Error`
    /// status.
    pub fn clear_failed_entries(&self) -> EngineResult<usize> {
        let cleared = self.store.clear_failed(self.config.max_retries)?;
        if cleared > 0 {
            tracing::info!(cleared, "cleared failed sync entries");
        }
        Ok(cleared)
    }

    /// Gives permanently failed entries a fresh retry budget.
    pub fn retry_failed_entries(&self) -> EngineResult<usize> {
        let reset = self.store.retry_failed(self.config.max_retries)?;
        if reset > 0 {
            tracing::info!(reset, "re-queued failed sync entries");
        }
        Ok(reset)
    }
}
