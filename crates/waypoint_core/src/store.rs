//! Journaled local store: the cache and the sync queue behind one lock.

use crate::cache::{LocalCache, SyncStore};
use crate::config::Config;
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::journal::{decode_frames, encode_frame, JournalOp};
use crate::queue::{EnqueueOutcome, EnqueueRequest, QueueEntry, SyncQueue};
use crate::record::CachedRecord;
use crate::schema::{IndexDef, Schema, TableSchema};
use crate::table::Table;
use crate::types::{RecordId, SyncStatus, Timestamp};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use waypoint_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// Per-table counters reported by [`LocalStore::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    /// Table name.
    pub table: String,
    /// Live records.
    pub records: usize,
    /// Records waiting to sync (tombstones included).
    pub pending: usize,
    /// Records whose sync failed permanently.
    pub errored: usize,
    /// Local tombstones awaiting a remote delete.
    pub tombstones: usize,
}

/// Snapshot of store counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Per-table counters, ordered by table name.
    pub tables: Vec<TableStats>,
    /// Queued entries.
    pub queue_len: usize,
    /// Journal size in bytes.
    pub journal_bytes: u64,
}

#[derive(Default)]
struct StoreState {
    tables: HashMap<String, Table>,
    queue: SyncQueue,
}

impl StoreState {
    fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    fn record(&self, table: &str, id: &RecordId) -> Option<&CachedRecord> {
        self.table(table).and_then(|t| t.get(id))
    }

    fn apply(&mut self, schema: &Schema, op: JournalOp) {
        match op {
            JournalOp::PutRecord(record) => {
                let table = self
                    .tables
                    .entry(record.table.clone())
                    .or_insert_with(|| Table::new(indexes_for(schema, &record.table)));
                table.put(record);
            }
            JournalOp::RemoveRecord { table, id } => {
                if let Some(table) = self.tables.get_mut(&table) {
                    table.remove(&id);
                }
            }
            JournalOp::PutEntry(entry) => self.queue.put(entry),
            JournalOp::RemoveEntry(id) => {
                self.queue.remove(id);
            }
            JournalOp::Checkpoint { next_entry_id } => self.queue.advance_next_id(next_entry_id),
        }
    }
}

fn indexes_for<'a>(schema: &'a Schema, table: &str) -> &'a [IndexDef] {
    schema.get(table).map(TableSchema::indexes).unwrap_or(&[])
}

/// Two snapshots of an entry describe the same pending change.
fn same_version(a: &QueueEntry, b: &QueueEntry) -> bool {
    a.timestamp == b.timestamp && a.operation == b.operation && a.payload == b.payload
}

/// The local cache and sync queue, persisted to an append-only journal.
///
/// Every mutation is planned against the in-memory state, written to the
/// journal as one frame, and only then applied. A crash therefore leaves
/// either the whole change or none of it, which keeps a record and its queue
/// entry consistent.
///
/// # Example
///
/// ```rust
/// use waypoint_core::{LocalCache, LocalStore, RecordId, Schema, CachedRecord};
/// use serde_json::json;
///
/// let store = LocalStore::open_in_memory(Schema::new())?;
/// let fields = json!({ "title": "Lisbon" }).as_object().cloned().unwrap();
/// store.put(CachedRecord::synced("trips", RecordId::from("t1"), fields))?;
///
/// assert!(store.get("trips", &RecordId::from("t1"))?.is_some());
/// # Ok::<(), waypoint_core::CoreError>(())
/// ```
pub struct LocalStore {
    config: Config,
    schema: Schema,
    /// Store directory (holds the lock). None for in-memory stores.
    dir: Option<StoreDir>,
    state: RwLock<StoreState>,
    journal: Mutex<Box<dyn StorageBackend>>,
}

impl LocalStore {
    /// Opens or creates a store in `path`.
    pub fn open(path: impl AsRef<Path>, schema: Schema) -> CoreResult<Self> {
        Self::open_with_config(path, schema, Config::default())
    }

    /// Opens a store in `path` with custom configuration.
    ///
    /// Fails with [`CoreError::StoreLocked`] if another handle holds the
    /// directory.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        schema: Schema,
        config: Config,
    ) -> CoreResult<Self> {
        let dir = StoreDir::open(path.as_ref(), config.create_if_missing)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        let mut store = Self::open_with_backend(schema, config, Box::new(backend))?;
        store.dir = Some(dir);
        Ok(store)
    }

    /// Opens an in-memory store. Nothing survives a drop.
    pub fn open_in_memory(schema: Schema) -> CoreResult<Self> {
        Self::open_with_backend(schema, Config::default(), Box::new(InMemoryBackend::new()))
    }

    /// Opens a store over an arbitrary journal backend, replaying its
    /// contents.
    pub fn open_with_backend(
        schema: Schema,
        config: Config,
        mut backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let state = Self::recover(&schema, backend.as_mut())?;
        Ok(Self {
            config,
            schema,
            dir: None,
            state: RwLock::new(state),
            journal: Mutex::new(backend),
        })
    }

    fn recover(schema: &Schema, backend: &mut dyn StorageBackend) -> CoreResult<StoreState> {
        let bytes = backend.read_all()?;
        let decoded = decode_frames(&bytes);

        if let Some(reason) = &decoded.torn_tail {
            tracing::warn!(
                valid_len = decoded.valid_len,
                size = bytes.len(),
                error = %reason,
                "discarding torn journal tail"
            );
            backend.truncate(decoded.valid_len)?;
            backend.sync()?;
        }

        let mut state = StoreState::default();
        let batches = decoded.batches.len();
        for op in decoded.batches.into_iter().flatten() {
            state.apply(schema, op);
        }

        tracing::debug!(
            batches,
            records = state.tables.values().map(Table::len).sum::<usize>(),
            queued = state.queue.len(),
            "local store recovered"
        );
        Ok(state)
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the store directory, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    /// Names of tables that hold at least one record, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let state = self.state.read();
        let mut names: Vec<String> = state
            .tables
            .iter()
            .filter(|(_, table)| table.len() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Collects per-table and queue counters.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        let state = self.state.read();
        let mut tables: Vec<TableStats> = state
            .tables
            .iter()
            .filter(|(_, table)| table.len() > 0)
            .map(|(name, table)| {
                let tombstones = table.iter().filter(|r| !r.is_live()).count();
                TableStats {
                    table: name.clone(),
                    records: table.len() - tombstones,
                    pending: table.with_status(SyncStatus::Pending).len(),
                    errored: table.with_status(SyncStatus::Error).len(),
                    tombstones,
                }
            })
            .collect();
        tables.sort_by(|a, b| a.table.cmp(&b.table));

        Ok(StoreStats {
            tables,
            queue_len: state.queue.len(),
            journal_bytes: self.journal.lock().size()?,
        })
    }

    /// Current journal size in bytes.
    pub fn journal_size(&self) -> CoreResult<u64> {
        Ok(self.journal.lock().size()?)
    }

    /// Rewrites the journal as a single checkpoint frame.
    pub fn compact(&self) -> CoreResult<()> {
        // Commits need the write lock, so a read lock is enough to freeze
        // the state while the image is written.
        let state = self.state.read();
        self.write_checkpoint(&state)
    }

    fn write_checkpoint(&self, state: &StoreState) -> CoreResult<()> {
        let mut ops = vec![JournalOp::Checkpoint {
            next_entry_id: state.queue.next_id(),
        }];
        let mut names: Vec<&String> = state.tables.keys().collect();
        names.sort();
        for name in names {
            if let Some(table) = state.tables.get(name) {
                ops.extend(table.iter().cloned().map(JournalOp::PutRecord));
            }
        }
        ops.extend(state.queue.iter().cloned().map(JournalOp::PutEntry));

        let frame = encode_frame(&ops)?;
        let mut journal = self.journal.lock();
        let before = journal.size()?;
        journal.replace(&frame)?;
        tracing::info!(before, after = frame.len(), "journal compacted");
        Ok(())
    }

    /// Journals `ops` as one frame, then applies them.
    fn commit(&self, state: &mut StoreState, ops: Vec<JournalOp>) -> CoreResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let frame = encode_frame(&ops)?;
        let size = {
            let mut journal = self.journal.lock();
            let before = journal.size()?;
            let written = journal.append(&frame).and_then(|_| {
                if self.config.sync_on_write {
                    journal.sync()?;
                }
                Ok(())
            });
            if let Err(e) = written {
                // The state is left unapplied, so the frame must not replay
                // on the next open.
                if let Err(rollback) = journal.truncate(before) {
                    tracing::error!(
                        before,
                        error = %rollback,
                        "failed to roll back unacknowledged journal frame"
                    );
                }
                return Err(e.into());
            }
            journal.size()?
        };

        for op in ops {
            state.apply(&self.schema, op);
        }

        if self.config.compact_threshold > 0 && size > self.config.compact_threshold {
            // The batch is already durable; a failed compaction only leaves
            // the journal long.
            if let Err(e) = self.write_checkpoint(state) {
                tracing::warn!(size, error = %e, "automatic compaction failed");
            }
        }
        Ok(())
    }
}

impl LocalCache for LocalStore {
    fn get(&self, table: &str, id: &RecordId) -> CoreResult<Option<CachedRecord>> {
        Ok(self.state.read().record(table, id).cloned())
    }

    fn put(&self, record: CachedRecord) -> CoreResult<()> {
        let mut state = self.state.write();
        self.commit(&mut state, vec![JournalOp::PutRecord(record)])
    }

    fn delete(&self, table: &str, id: &RecordId) -> CoreResult<bool> {
        let mut state = self.state.write();
        if state.record(table, id).is_none() {
            return Ok(false);
        }
        let op = JournalOp::RemoveRecord {
            table: table.to_owned(),
            id: id.clone(),
        };
        self.commit(&mut state, vec![op])?;
        Ok(true)
    }

    fn query(
        &self,
        table: &str,
        predicate: &dyn Fn(&CachedRecord) -> bool,
    ) -> CoreResult<Vec<CachedRecord>> {
        let state = self.state.read();
        Ok(state
            .table(table)
            .map(|t| t.iter().filter(|r| predicate(r)).cloned().collect())
            .unwrap_or_default())
    }

    fn query_index(
        &self,
        table: &str,
        index: &str,
        key: &[Value],
    ) -> CoreResult<Vec<CachedRecord>> {
        let declared = indexes_for(&self.schema, table)
            .iter()
            .any(|def| def.name() == index);
        if !declared {
            return Err(CoreError::UnknownIndex {
                table: table.to_owned(),
                index: index.to_owned(),
            });
        }

        let state = self.state.read();
        let Some(t) = state.table(table) else {
            return Ok(Vec::new());
        };
        let key = IndexDef::key_from_values(key);
        Ok(t.lookup(index, &key)
            .map(|records| records.into_iter().cloned().collect())
            .unwrap_or_default())
    }

    fn records_with_status(
        &self,
        table: &str,
        status: SyncStatus,
    ) -> CoreResult<Vec<CachedRecord>> {
        let state = self.state.read();
        Ok(state
            .table(table)
            .map(|t| t.with_status(status).into_iter().cloned().collect())
            .unwrap_or_default())
    }
}

impl SyncStore for LocalStore {
    fn stage_mutation(
        &self,
        record: CachedRecord,
        request: EnqueueRequest,
    ) -> CoreResult<EnqueueOutcome> {
        let mut state = self.state.write();
        let now = record.locally_modified_at.unwrap_or_else(Utc::now);
        let outcome = state.queue.plan(request, now);

        let ops = match &outcome {
            EnqueueOutcome::Cancelled(entry) => vec![
                JournalOp::RemoveEntry(entry.id),
                JournalOp::RemoveRecord {
                    table: entry.table.clone(),
                    id: entry.record_id.clone(),
                },
            ],
            EnqueueOutcome::Inserted(entry) | EnqueueOutcome::Merged(entry) => vec![
                JournalOp::PutRecord(record),
                JournalOp::PutEntry(entry.clone()),
            ],
        };
        self.commit(&mut state, ops)?;
        Ok(outcome)
    }

    fn queue_entry(&self, table: &str, id: &RecordId) -> CoreResult<Option<QueueEntry>> {
        Ok(self.state.read().queue.find(table, id).cloned())
    }

    fn queue_snapshot(&self) -> CoreResult<Vec<QueueEntry>> {
        Ok(self.state.read().queue.snapshot())
    }

    fn drainable_entries(&self, max_retries: u32) -> CoreResult<Vec<QueueEntry>> {
        Ok(self.state.read().queue.drainable(max_retries))
    }

    fn complete_entry(&self, entry: &QueueEntry, now: Timestamp) -> CoreResult<bool> {
        use crate::queue::Operation;

        let mut state = self.state.write();
        let current = state.queue.get(entry.id).cloned();
        let mut ops = Vec::new();

        let completed = match current {
            Some(current) if same_version(&current, entry) => {
                ops.push(JournalOp::RemoveEntry(entry.id));
                match entry.operation {
                    Operation::Delete => ops.push(JournalOp::RemoveRecord {
                        table: entry.table.clone(),
                        id: entry.record_id.clone(),
                    }),
                    Operation::Insert | Operation::Update => {
                        if let Some(record) = state.record(&entry.table, &entry.record_id) {
                            let mut record = record.clone();
                            record.mark_synced(now);
                            ops.push(JournalOp::PutRecord(record));
                        }
                    }
                }
                true
            }
            Some(mut current) => {
                // Edited again mid-flight. The snapshot's effect on the remote
                // decides how the merged entry must go out: a landed insert
                // means the row exists, a landed delete means it is gone.
                let rewritten = match (entry.operation, current.operation) {
                    (Operation::Insert, Operation::Insert) => Some(Operation::Update),
                    (Operation::Delete, Operation::Update) => Some(Operation::Insert),
                    _ => None,
                };
                if let Some(operation) = rewritten {
                    tracing::debug!(
                        table = %entry.table,
                        id = %entry.record_id,
                        from = %current.operation,
                        to = %operation,
                        "rewriting entry changed during sync"
                    );
                    current.operation = operation;
                    ops.push(JournalOp::PutEntry(current));
                }
                false
            }
            None => {
                // The insert was cancelled by a local delete while in flight:
                // the remote row it created has to be deleted too.
                let orphaned = entry.operation == Operation::Insert
                    && state.queue.find(&entry.table, &entry.record_id).is_none()
                    && state.record(&entry.table, &entry.record_id).is_none();
                if orphaned {
                    tracing::debug!(
                        table = %entry.table,
                        id = %entry.record_id,
                        "re-queueing delete for insert cancelled during sync"
                    );
                    let mut tombstone =
                        CachedRecord::pending(&entry.table, entry.record_id.clone(), Map::new(), now);
                    tombstone.deleted = true;
                    let request = EnqueueRequest::delete(&entry.table, entry.record_id.clone());
                    if let EnqueueOutcome::Inserted(delete) = state.queue.plan(request, now) {
                        ops.push(JournalOp::PutRecord(tombstone));
                        ops.push(JournalOp::PutEntry(delete));
                    }
                }
                false
            }
        };

        self.commit(&mut state, ops)?;
        Ok(completed)
    }

    fn fail_entry(
        &self,
        entry: &QueueEntry,
        error: &str,
        retryable: bool,
        max_retries: u32,
    ) -> CoreResult<Option<QueueEntry>> {
        let mut state = self.state.write();
        let Some(current) = state.queue.get(entry.id) else {
            return Ok(None);
        };
        if !same_version(current, entry) {
            return Ok(None);
        }

        let mut updated = current.clone();
        updated.register_failure(error, retryable, max_retries);

        let mut ops = vec![JournalOp::PutEntry(updated.clone())];
        if updated.is_failed(max_retries) {
            if let Some(record) = state.record(&entry.table, &entry.record_id) {
                let mut record = record.clone();
                record.mark_error(error);
                ops.push(JournalOp::PutRecord(record));
            }
        }
        self.commit(&mut state, ops)?;
        Ok(Some(updated))
    }

    fn queue_len(&self) -> CoreResult<usize> {
        Ok(self.state.read().queue.len())
    }

    fn failed_count(&self, max_retries: u32) -> CoreResult<usize> {
        Ok(self.state.read().queue.failed_count(max_retries))
    }

    fn retry_failed(&self, max_retries: u32) -> CoreResult<usize> {
        let mut state = self.state.write();
        let mut ops = Vec::new();
        let mut count = 0;

        for entry in state.queue.failed(max_retries) {
            let mut entry = entry.clone();
            entry.reset_retries();
            if let Some(record) = state.record(&entry.table, &entry.record_id) {
                let mut record = record.clone();
                record.sync_status = SyncStatus::Pending;
                record.sync_error = None;
                ops.push(JournalOp::PutRecord(record));
            }
            ops.push(JournalOp::PutEntry(entry));
            count += 1;
        }

        self.commit(&mut state, ops)?;
        Ok(count)
    }

    fn clear_failed(&self, max_retries: u32) -> CoreResult<usize> {
        let mut state = self.state.write();
        let ops: Vec<JournalOp> = state
            .queue
            .failed(max_retries)
            .into_iter()
            .map(|entry| JournalOp::RemoveEntry(entry.id))
            .collect();
        let count = ops.len();
        self.commit(&mut state, ops)?;
        Ok(count)
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.path())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Operation;
    use crate::types::Fields;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn schema() -> Schema {
        Schema::new().table(TableSchema::new("notes").index("trip_id"))
    }

    fn stage_insert(store: &LocalStore, id: &str, content: &str) -> EnqueueOutcome {
        let payload = fields(json!({ "trip_id": "t1", "content": content }));
        let record = CachedRecord::pending("notes", RecordId::from(id), payload.clone(), Utc::now());
        let request = EnqueueRequest::insert("notes", RecordId::from(id), record.fields.clone());
        store.stage_mutation(record, request).unwrap()
    }

    #[test]
    fn put_get_delete() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let id = RecordId::from("n1");
        store
            .put(CachedRecord::synced("notes", id.clone(), fields(json!({ "content": "a" }))))
            .unwrap();

        let record = store.get("notes", &id).unwrap().unwrap();
        assert_eq!(record.field("content"), Some(&json!("a")));
        assert_eq!(record.field("id"), Some(&json!("n1")));

        assert!(store.delete("notes", &id).unwrap());
        assert!(!store.delete("notes", &id).unwrap());
        assert!(store.get("notes", &id).unwrap().is_none());
    }

    #[test]
    fn stage_writes_record_and_entry_together() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let outcome = stage_insert(&store, "n1", "hello");

        assert!(matches!(outcome, EnqueueOutcome::Inserted(_)));
        let record = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
        let entry = store.queue_entry("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(entry.operation, Operation::Insert);
    }

    #[test]
    fn query_index_uses_declared_index() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        stage_insert(&store, "n1", "a");
        stage_insert(&store, "n2", "b");

        let hits = store.query_index("notes", "trip_id", &[json!("t1")]).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(store
            .query_index("notes", "trip_id", &[json!("t2")])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn query_index_rejects_undeclared_index() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let result = store.query_index("notes", "date", &[json!("2024-01-01")]);
        assert!(matches!(result, Err(CoreError::UnknownIndex { .. })));
    }

    #[test]
    fn complete_marks_record_synced() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let entry = stage_insert(&store, "n1", "a").entry().cloned().unwrap();

        assert!(store.complete_entry(&entry, Utc::now()).unwrap());
        assert_eq!(store.queue_len().unwrap(), 0);
        let record = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert!(record.last_synced_at.is_some());
    }

    #[test]
    fn complete_keeps_newer_edit_queued_as_update() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let snapshot = stage_insert(&store, "n1", "a").entry().cloned().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        stage_insert(&store, "n1", "b");

        assert!(!store.complete_entry(&snapshot, Utc::now()).unwrap());
        let entry = store.queue_entry("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(entry.operation, Operation::Update);
        assert_eq!(entry.payload.unwrap().get("content"), Some(&json!("b")));
        let record = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn complete_of_delete_turns_recreate_into_insert() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let id = RecordId::from("n1");
        store
            .put(CachedRecord::synced("notes", id.clone(), fields(json!({ "content": "a" }))))
            .unwrap();

        let mut tombstone = store.get("notes", &id).unwrap().unwrap();
        tombstone.deleted = true;
        tombstone.mark_pending(Utc::now());
        let snapshot = store
            .stage_mutation(tombstone, EnqueueRequest::delete("notes", id.clone()))
            .unwrap()
            .entry()
            .cloned()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        stage_insert(&store, "n1", "back");
        assert_eq!(
            store.queue_entry("notes", &id).unwrap().unwrap().operation,
            Operation::Update
        );

        assert!(!store.complete_entry(&snapshot, Utc::now()).unwrap());
        let entry = store.queue_entry("notes", &id).unwrap().unwrap();
        assert_eq!(entry.operation, Operation::Insert);
        assert_eq!(entry.payload.unwrap().get("content"), Some(&json!("back")));
        assert!(store.get("notes", &id).unwrap().unwrap().is_live());
    }

    #[test]
    fn complete_after_cancelled_insert_requeues_delete() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let snapshot = stage_insert(&store, "n1", "a").entry().cloned().unwrap();

        let mut tombstone = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        tombstone.deleted = true;
        let outcome = store
            .stage_mutation(tombstone, EnqueueRequest::delete("notes", RecordId::from("n1")))
            .unwrap();
        assert!(outcome.is_cancelled());

        assert!(!store.complete_entry(&snapshot, Utc::now()).unwrap());
        let entry = store.queue_entry("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(entry.operation, Operation::Delete);
        let record = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert!(record.deleted);
    }

    #[test]
    fn exhausted_entry_marks_record_error() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let entry = stage_insert(&store, "n1", "a").entry().cloned().unwrap();

        let updated = store
            .fail_entry(&entry, "permission denied", false, 3)
            .unwrap()
            .unwrap();
        assert!(updated.is_failed(3));
        assert_eq!(store.failed_count(3).unwrap(), 1);
        assert!(store.drainable_entries(3).unwrap().is_empty());

        let record = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Error);
        assert_eq!(record.sync_error.as_deref(), Some("permission denied"));
    }

    #[test]
    fn fail_ignores_stale_snapshot() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let snapshot = stage_insert(&store, "n1", "a").entry().cloned().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        stage_insert(&store, "n1", "b");

        assert!(store.fail_entry(&snapshot, "timeout", true, 3).unwrap().is_none());
        let entry = store.queue_entry("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(entry.retries, 0);
    }

    #[test]
    fn retry_failed_restores_pending() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let entry = stage_insert(&store, "n1", "a").entry().cloned().unwrap();
        store.fail_entry(&entry, "denied", false, 3).unwrap();

        assert_eq!(store.retry_failed(3).unwrap(), 1);
        assert_eq!(store.failed_count(3).unwrap(), 0);
        let record = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert!(record.sync_error.is_none());
    }

    #[test]
    fn clear_failed_keeps_error_status() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        let entry = stage_insert(&store, "n1", "a").entry().cloned().unwrap();
        stage_insert(&store, "n2", "b");
        store.fail_entry(&entry, "denied", false, 3).unwrap();

        assert_eq!(store.clear_failed(3).unwrap(), 1);
        assert_eq!(store.queue_len().unwrap(), 1);
        let record = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Error);
    }

    #[test]
    fn state_survives_reopen() {
        let temp = tempdir().unwrap();
        {
            let store = LocalStore::open(temp.path(), schema()).unwrap();
            stage_insert(&store, "n1", "a");
            stage_insert(&store, "n2", "b");
        }

        let store = LocalStore::open(temp.path(), schema()).unwrap();
        assert_eq!(store.queue_len().unwrap(), 2);
        let ids: Vec<_> = store
            .queue_snapshot()
            .unwrap()
            .into_iter()
            .map(|e| e.record_id.to_string())
            .collect();
        assert_eq!(ids, vec!["n1", "n2"]);
        assert_eq!(
            store.query_index("notes", "trip_id", &[json!("t1")]).unwrap().len(),
            2
        );
    }

    #[test]
    fn second_handle_is_locked_out() {
        let temp = tempdir().unwrap();
        let _store = LocalStore::open(temp.path(), schema()).unwrap();
        let second = LocalStore::open(temp.path(), schema());
        assert!(matches!(second, Err(CoreError::StoreLocked)));
    }

    #[test]
    fn torn_tail_is_discarded() {
        let temp = tempdir().unwrap();
        let journal = temp.path().join("journal.log");
        {
            let store = LocalStore::open(temp.path(), schema()).unwrap();
            stage_insert(&store, "n1", "a");
        }
        let intact = std::fs::metadata(&journal).unwrap().len();
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().append(true).open(&journal).unwrap();
            file.write_all(b"WPJ1\xff\xff").unwrap();
        }

        let store = LocalStore::open(temp.path(), schema()).unwrap();
        assert_eq!(store.queue_len().unwrap(), 1);
        assert_eq!(std::fs::metadata(&journal).unwrap().len(), intact);
    }

    /// A journal whose next append, sync or replace can be made to fail.
    /// A failing append writes half of its data first.
    #[derive(Clone, Default)]
    struct FaultyBackend {
        data: Arc<Mutex<Vec<u8>>>,
        fail_append: Arc<AtomicBool>,
        fail_sync: Arc<AtomicBool>,
        fail_replace: Arc<AtomicBool>,
    }

    fn disk_full() -> waypoint_storage::StorageError {
        std::io::Error::other("no space left on device").into()
    }

    impl StorageBackend for FaultyBackend {
        fn read_at(&self, offset: u64, len: usize) -> waypoint_storage::StorageResult<Vec<u8>> {
            let data = self.data.lock();
            let start = offset as usize;
            Ok(data[start..start + len].to_vec())
        }

        fn append(&mut self, bytes: &[u8]) -> waypoint_storage::StorageResult<u64> {
            let mut data = self.data.lock();
            let offset = data.len() as u64;
            if self.fail_append.swap(false, Ordering::SeqCst) {
                data.extend_from_slice(&bytes[..bytes.len() / 2]);
                return Err(disk_full());
            }
            data.extend_from_slice(bytes);
            Ok(offset)
        }

        fn size(&self) -> waypoint_storage::StorageResult<u64> {
            Ok(self.data.lock().len() as u64)
        }

        fn sync(&mut self) -> waypoint_storage::StorageResult<()> {
            if self.fail_sync.swap(false, Ordering::SeqCst) {
                return Err(disk_full());
            }
            Ok(())
        }

        fn truncate(&mut self, new_size: u64) -> waypoint_storage::StorageResult<()> {
            self.data.lock().truncate(new_size as usize);
            Ok(())
        }

        fn replace(&mut self, bytes: &[u8]) -> waypoint_storage::StorageResult<()> {
            if self.fail_replace.load(Ordering::SeqCst) {
                return Err(disk_full());
            }
            *self.data.lock() = bytes.to_vec();
            Ok(())
        }
    }

    fn reopen(backend: &FaultyBackend) -> LocalStore {
        let image = InMemoryBackend::with_data(backend.data.lock().clone());
        LocalStore::open_with_backend(schema(), Config::default(), Box::new(image)).unwrap()
    }

    fn try_stage_insert(store: &LocalStore, id: &str) -> CoreResult<EnqueueOutcome> {
        let payload = fields(json!({ "trip_id": "t1", "content": id }));
        let record = CachedRecord::pending("notes", RecordId::from(id), payload, Utc::now());
        let request = EnqueueRequest::insert("notes", RecordId::from(id), record.fields.clone());
        store.stage_mutation(record, request)
    }

    #[test]
    fn partial_append_is_rolled_back() {
        let backend = FaultyBackend::default();
        let store =
            LocalStore::open_with_backend(schema(), Config::default(), Box::new(backend.clone()))
                .unwrap();

        stage_insert(&store, "n1", "a");
        backend.fail_append.store(true, Ordering::SeqCst);
        assert!(matches!(try_stage_insert(&store, "n2"), Err(CoreError::Storage(_))));
        assert!(store.get("notes", &RecordId::from("n2")).unwrap().is_none());
        stage_insert(&store, "n3", "c");

        let recovered = reopen(&backend);
        let ids: Vec<String> = recovered
            .queue_snapshot()
            .unwrap()
            .into_iter()
            .map(|e| e.record_id.to_string())
            .collect();
        assert_eq!(ids, ["n1", "n3"]);
        assert!(recovered.get("notes", &RecordId::from("n3")).unwrap().is_some());
    }

    #[test]
    fn failed_sync_does_not_replay() {
        let backend = FaultyBackend::default();
        let store =
            LocalStore::open_with_backend(schema(), Config::default(), Box::new(backend.clone()))
                .unwrap();

        backend.fail_sync.store(true, Ordering::SeqCst);
        assert!(try_stage_insert(&store, "n1").is_err());
        assert_eq!(store.queue_len().unwrap(), 0);
        assert_eq!(store.journal_size().unwrap(), 0);

        let recovered = reopen(&backend);
        assert!(recovered.get("notes", &RecordId::from("n1")).unwrap().is_none());
        assert_eq!(recovered.queue_len().unwrap(), 0);
    }

    #[test]
    fn failed_auto_compaction_keeps_the_write() {
        let backend = FaultyBackend::default();
        backend.fail_replace.store(true, Ordering::SeqCst);
        let config = Config::default().compact_threshold(1);
        let store =
            LocalStore::open_with_backend(schema(), config, Box::new(backend.clone())).unwrap();

        assert!(try_stage_insert(&store, "n1").is_ok());
        assert!(store.get("notes", &RecordId::from("n1")).unwrap().is_some());
        assert_eq!(reopen(&backend).queue_len().unwrap(), 1);
    }

    #[test]
    fn compaction_preserves_state_and_ids() {
        let temp = tempdir().unwrap();
        {
            let store = LocalStore::open(temp.path(), schema()).unwrap();
            let first = stage_insert(&store, "n1", "a").entry().cloned().unwrap();
            store.complete_entry(&first, Utc::now()).unwrap();
            for i in 0..5 {
                stage_insert(&store, "n2", &format!("edit {i}"));
            }
            let before = store.journal_size().unwrap();
            store.compact().unwrap();
            assert!(store.journal_size().unwrap() < before);
        }

        let store = LocalStore::open(temp.path(), schema()).unwrap();
        let record = store.get("notes", &RecordId::from("n1")).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(store.queue_len().unwrap(), 1);

        // n1's entry id (1) must not be handed out again.
        let outcome = stage_insert(&store, "n3", "c");
        assert!(outcome.entry().unwrap().id.as_u64() > 2);
    }

    #[test]
    fn automatic_compaction_above_threshold() {
        let config = Config::default().compact_threshold(512);
        let backend = Box::new(InMemoryBackend::new());
        let store = LocalStore::open_with_backend(schema(), config, backend).unwrap();
        for i in 0..20 {
            stage_insert(&store, "n1", &format!("edit {i}"));
        }
        assert!(store.journal_size().unwrap() < 2048);
        assert_eq!(store.queue_len().unwrap(), 1);
    }

    #[test]
    fn stats_count_statuses() {
        let store = LocalStore::open_in_memory(schema()).unwrap();
        stage_insert(&store, "n1", "a");
        store
            .put(CachedRecord::synced("trips", RecordId::from("t1"), Map::new()))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.queue_len, 1);
        assert_eq!(stats.tables.len(), 2);
        assert_eq!(stats.tables[0].table, "notes");
        assert_eq!(stats.tables[0].pending, 1);
        assert_eq!(stats.tables[1].records, 1);
        assert_eq!(store.table_names(), vec!["notes", "trips"]);
    }
}
