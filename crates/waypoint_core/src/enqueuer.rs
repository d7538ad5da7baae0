//! The optimistic write path.
//!
//! Every local change goes through [`MutationEnqueuer`]: the cache is updated
//! immediately with a `Pending` record and the change is queued for the sync
//! engine, in one atomic store write. Nothing here talks to the remote store,
//! so writes succeed offline.

use crate::cache::SyncStore;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::queue::{EnqueueOutcome, EnqueueRequest, Operation};
use crate::record::CachedRecord;
use crate::types::{Fields, RecordId, ID_FIELD};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

/// Applies local mutations to the cache and queues them for sync.
pub struct MutationEnqueuer<S> {
    store: Arc<S>,
}

impl<S> Clone for MutationEnqueuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SyncStore> MutationEnqueuer<S> {
    /// Creates an enqueuer writing to `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Creates a record from `payload`.
    ///
    /// Uses the payload's `"id"` if it has one, otherwise generates a UUID.
    pub fn create(&self, table: &str, payload: Value) -> CoreResult<CachedRecord> {
        let fields = into_fields(table, payload)?;
        let id = match fields.get(ID_FIELD) {
            Some(Value::String(id)) => RecordId::from(id.as_str()),
            Some(other) => {
                return Err(CoreError::invalid_payload(
                    table,
                    format!("id must be a string, got {other}"),
                ))
            }
            None => RecordId::generate(),
        };
        self.create_fields(table, id, fields)
    }

    /// Creates a record with a caller-chosen id.
    pub fn create_with_id(
        &self,
        table: &str,
        id: RecordId,
        payload: Value,
    ) -> CoreResult<CachedRecord> {
        let fields = into_fields(table, payload)?;
        self.create_fields(table, id, fields)
    }

    /// Creates a typed entity.
    pub fn create_entity<E: Entity>(&self, entity: &E) -> CoreResult<CachedRecord> {
        self.create_fields(E::TABLE, entity.record_id(), entity.to_fields()?)
    }

    fn create_fields(
        &self,
        table: &str,
        id: RecordId,
        mut fields: Fields,
    ) -> CoreResult<CachedRecord> {
        let existing = self.store.get(table, &id)?;
        if existing.as_ref().is_some_and(CachedRecord::is_live) {
            return Err(CoreError::RecordExists {
                table: table.to_owned(),
                id: id.to_string(),
            });
        }

        fields.insert(ID_FIELD.to_owned(), Value::String(id.to_string()));
        let now = Utc::now();
        // Recreating over a tombstone keeps its sync history.
        let record = match existing {
            Some(mut tombstone) => {
                tombstone.fields = fields;
                tombstone.deleted = false;
                tombstone.mark_pending(now);
                tombstone
            }
            None => CachedRecord::pending(table, id.clone(), fields, now),
        };

        let request = EnqueueRequest::insert(table, id, record.fields.clone());
        self.stage(record, request)
    }

    /// Applies `changes` on top of the cached record.
    ///
    /// The queued payload is the full merged record, so earlier offline edits
    /// survive queue merging.
    pub fn update(&self, table: &str, id: &RecordId, changes: Value) -> CoreResult<CachedRecord> {
        let changes = into_fields(table, changes)?;
        let mut record = self.live_record(table, id)?;

        for (key, value) in changes {
            if key == ID_FIELD {
                if value.as_str() != Some(id.as_str()) {
                    return Err(CoreError::invalid_payload(table, "the id field cannot change"));
                }
                continue;
            }
            record.fields.insert(key, value);
        }
        record.mark_pending(Utc::now());

        let request = EnqueueRequest::update(table, id.clone(), record.fields.clone());
        self.stage(record, request)
    }

    /// Applies a partial update to a typed entity.
    pub fn update_entity<E: Entity>(&self, id: &RecordId, patch: Value) -> CoreResult<E> {
        let record = self.update(E::TABLE, id, patch)?;
        E::from_fields(&record.fields)
    }

    /// Deletes a record.
    ///
    /// The record stays in the cache as a pending tombstone until the remote
    /// delete is confirmed. If it was never synced, its queued insert and the
    /// record itself are dropped instead. Returns the tombstone, or `None`
    /// when the record was dropped.
    pub fn delete(&self, table: &str, id: &RecordId) -> CoreResult<Option<CachedRecord>> {
        let mut record = self.live_record(table, id)?;
        record.deleted = true;
        record.mark_pending(Utc::now());

        let request = EnqueueRequest::delete(table, id.clone());
        let outcome = self.store.stage_mutation(record.clone(), request)?;
        log_outcome(&outcome);
        Ok((!outcome.is_cancelled()).then_some(record))
    }

    /// Deletes a typed entity.
    pub fn delete_entity<E: Entity>(&self, id: &RecordId) -> CoreResult<Option<CachedRecord>> {
        self.delete(E::TABLE, id)
    }

    /// Reads a live typed entity from the cache.
    pub fn get_entity<E: Entity>(&self, id: &RecordId) -> CoreResult<Option<E>> {
        match self.store.get(E::TABLE, id)? {
            Some(record) if record.is_live() => E::from_fields(&record.fields).map(Some),
            _ => Ok(None),
        }
    }

    /// Queues a change for an id, deriving the optimistic record from the
    /// request and the current cache contents.
    ///
    /// Insert and update requests need a payload unless the record is
    /// already cached.
    pub fn enqueue_sync(&self, request: EnqueueRequest) -> CoreResult<EnqueueOutcome> {
        let now = Utc::now();
        let existing = self.store.get(&request.table, &request.record_id)?;

        let record = match request.operation {
            Operation::Delete => {
                let mut record = existing.unwrap_or_else(|| {
                    CachedRecord::pending(
                        &request.table,
                        request.record_id.clone(),
                        Fields::new(),
                        now,
                    )
                });
                record.deleted = true;
                record.mark_pending(now);
                record
            }
            Operation::Insert | Operation::Update => {
                let fields = match (&request.payload, &existing) {
                    (Some(payload), _) => payload.clone(),
                    (None, Some(record)) => record.fields.clone(),
                    (None, None) => {
                        return Err(CoreError::invalid_payload(
                            &request.table,
                            format!("{} without payload for uncached record", request.operation),
                        ))
                    }
                };
                let mut record = existing.unwrap_or_else(|| {
                    CachedRecord::pending(&request.table, request.record_id.clone(), Fields::new(), now)
                });
                record.fields = fields;
                record
                    .fields
                    .insert(ID_FIELD.to_owned(), Value::String(request.record_id.to_string()));
                record.deleted = false;
                record.mark_pending(now);
                record
            }
        };

        let mut request = request;
        if request.operation != Operation::Delete {
            request.payload = Some(record.fields.clone());
        }
        let outcome = self.store.stage_mutation(record, request)?;
        log_outcome(&outcome);
        Ok(outcome)
    }

    fn live_record(&self, table: &str, id: &RecordId) -> CoreResult<CachedRecord> {
        self.store
            .get(table, id)?
            .filter(CachedRecord::is_live)
            .ok_or_else(|| CoreError::not_found(table, id))
    }

    fn stage(&self, record: CachedRecord, request: EnqueueRequest) -> CoreResult<CachedRecord> {
        let outcome = self.store.stage_mutation(record.clone(), request)?;
        log_outcome(&outcome);
        Ok(record)
    }
}

fn log_outcome(outcome: &EnqueueOutcome) {
    match outcome {
        EnqueueOutcome::Inserted(entry) => tracing::debug!(
            entry = %entry.id,
            table = %entry.table,
            id = %entry.record_id,
            operation = %entry.operation,
            "queued mutation"
        ),
        EnqueueOutcome::Merged(entry) => tracing::debug!(
            entry = %entry.id,
            table = %entry.table,
            id = %entry.record_id,
            operation = %entry.operation,
            "merged mutation into queued entry"
        ),
        EnqueueOutcome::Cancelled(entry) => tracing::debug!(
            entry = %entry.id,
            table = %entry.table,
            id = %entry.record_id,
            "delete cancelled unsynced insert"
        ),
    }
}

fn into_fields(table: &str, payload: Value) -> CoreResult<Fields> {
    match payload {
        Value::Object(fields) => Ok(fields),
        other => Err(CoreError::invalid_payload(
            table,
            format!("expected a JSON object, got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::schema::Schema;
    use crate::store::LocalStore;
    use crate::types::SyncStatus;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: RecordId,
        trip_id: String,
        content: String,
    }

    impl Entity for Note {
        const TABLE: &'static str = "notes";

        fn record_id(&self) -> RecordId {
            self.id.clone()
        }
    }

    fn enqueuer() -> MutationEnqueuer<LocalStore> {
        MutationEnqueuer::new(Arc::new(LocalStore::open_in_memory(Schema::new()).unwrap()))
    }

    #[test]
    fn create_generates_id_and_queues_insert() {
        let enqueuer = enqueuer();
        let record = enqueuer
            .create("notes", json!({ "content": "Pack sunscreen" }))
            .unwrap();

        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.field("id"), Some(&json!(record.id.as_str())));
        let entry = enqueuer
            .store()
            .queue_entry("notes", &record.id)
            .unwrap()
            .unwrap();
        assert_eq!(entry.operation, Operation::Insert);
        assert_eq!(entry.payload.unwrap().get("content"), Some(&json!("Pack sunscreen")));
    }

    #[test]
    fn create_uses_payload_id() {
        let enqueuer = enqueuer();
        let record = enqueuer
            .create("notes", json!({ "id": "n1", "content": "a" }))
            .unwrap();
        assert_eq!(record.id, RecordId::from("n1"));
    }

    #[test]
    fn create_rejects_duplicate_and_non_object() {
        let enqueuer = enqueuer();
        enqueuer
            .create_with_id("notes", RecordId::from("n1"), json!({}))
            .unwrap();

        let duplicate = enqueuer.create_with_id("notes", RecordId::from("n1"), json!({}));
        assert!(matches!(duplicate, Err(CoreError::RecordExists { .. })));

        let invalid = enqueuer.create("notes", json!(["not", "an", "object"]));
        assert!(matches!(invalid, Err(CoreError::InvalidPayload { .. })));
    }

    #[test]
    fn update_merges_fields_into_insert() {
        let enqueuer = enqueuer();
        let id = RecordId::from("n1");
        enqueuer
            .create_with_id("notes", id.clone(), json!({ "content": "a", "trip_id": "t1" }))
            .unwrap();
        enqueuer
            .update("notes", &id, json!({ "content": "b" }))
            .unwrap();

        let entry = enqueuer.store().queue_entry("notes", &id).unwrap().unwrap();
        assert_eq!(entry.operation, Operation::Insert);
        let payload = entry.payload.unwrap();
        assert_eq!(payload.get("content"), Some(&json!("b")));
        assert_eq!(payload.get("trip_id"), Some(&json!("t1")));
        assert_eq!(enqueuer.store().queue_len().unwrap(), 1);
    }

    #[test]
    fn update_cannot_change_id() {
        let enqueuer = enqueuer();
        let id = RecordId::from("n1");
        enqueuer.create_with_id("notes", id.clone(), json!({})).unwrap();

        let result = enqueuer.update("notes", &id, json!({ "id": "n2" }));
        assert!(matches!(result, Err(CoreError::InvalidPayload { .. })));
        enqueuer.update("notes", &id, json!({ "id": "n1", "x": 1 })).unwrap();
    }

    #[test]
    fn update_missing_record_fails() {
        let enqueuer = enqueuer();
        let result = enqueuer.update("notes", &RecordId::from("nope"), json!({ "a": 1 }));
        assert!(matches!(result, Err(CoreError::RecordNotFound { .. })));
    }

    #[test]
    fn delete_of_unsynced_create_drops_everything() {
        let enqueuer = enqueuer();
        let id = RecordId::from("n1");
        enqueuer.create_with_id("notes", id.clone(), json!({})).unwrap();

        assert!(enqueuer.delete("notes", &id).unwrap().is_none());
        assert!(enqueuer.store().get("notes", &id).unwrap().is_none());
        assert_eq!(enqueuer.store().queue_len().unwrap(), 0);
    }

    #[test]
    fn delete_of_synced_record_leaves_tombstone() {
        let enqueuer = enqueuer();
        let id = RecordId::from("n1");
        enqueuer
            .store()
            .put(CachedRecord::synced("notes", id.clone(), Fields::new()))
            .unwrap();

        let tombstone = enqueuer.delete("notes", &id).unwrap().unwrap();
        assert!(tombstone.deleted);
        assert_eq!(tombstone.sync_status, SyncStatus::Pending);

        let entry = enqueuer.store().queue_entry("notes", &id).unwrap().unwrap();
        assert_eq!(entry.operation, Operation::Delete);

        let again = enqueuer.delete("notes", &id);
        assert!(matches!(again, Err(CoreError::RecordNotFound { .. })));
    }

    #[test]
    fn recreate_over_tombstone_queues_update() {
        let enqueuer = enqueuer();
        let id = RecordId::from("n1");
        enqueuer
            .store()
            .put(CachedRecord::synced("notes", id.clone(), Fields::new()))
            .unwrap();
        enqueuer.delete("notes", &id).unwrap();

        let record = enqueuer
            .create_with_id("notes", id.clone(), json!({ "content": "back" }))
            .unwrap();
        assert!(record.is_live());
        let entry = enqueuer.store().queue_entry("notes", &id).unwrap().unwrap();
        assert_eq!(entry.operation, Operation::Update);
    }

    #[test]
    fn typed_entity_roundtrip() {
        let enqueuer = enqueuer();
        let note = Note {
            id: RecordId::from("n1"),
            trip_id: "t1".into(),
            content: "Pack sunscreen".into(),
        };
        enqueuer.create_entity(&note).unwrap();

        let updated: Note = enqueuer
            .update_entity::<Note>(&note.id, json!({ "content": "Pack hats" }))
            .unwrap();
        assert_eq!(updated.content, "Pack hats");
        assert_eq!(enqueuer.get_entity::<Note>(&note.id).unwrap(), Some(updated));

        enqueuer.delete_entity::<Note>(&note.id).unwrap();
        assert_eq!(enqueuer.get_entity::<Note>(&note.id).unwrap(), None);
    }

    #[test]
    fn enqueue_sync_requeues_cached_record() {
        let enqueuer = enqueuer();
        let id = RecordId::from("n1");
        enqueuer
            .store()
            .put(CachedRecord::synced("notes", id.clone(), Fields::new()))
            .unwrap();

        let outcome = enqueuer
            .enqueue_sync(EnqueueRequest {
                table: "notes".into(),
                operation: Operation::Update,
                record_id: id.clone(),
                payload: None,
            })
            .unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Inserted(_)));
        let record = enqueuer.store().get("notes", &id).unwrap().unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn enqueue_sync_without_payload_or_record_fails() {
        let enqueuer = enqueuer();
        let result = enqueuer.enqueue_sync(EnqueueRequest {
            table: "notes".into(),
            operation: Operation::Insert,
            record_id: RecordId::from("ghost"),
            payload: None,
        });
        assert!(matches!(result, Err(CoreError::InvalidPayload { .. })));
    }
}
