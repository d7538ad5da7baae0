//! Cached records and their sync metadata.

use crate::types::{Fields, RecordId, SyncStatus, Timestamp, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The client's current belief about one entity, plus sync metadata.
///
/// `fields` always carries the record id under `"id"` so the payload can be
/// handed to the remote store as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    /// Table (entity kind) the record belongs to.
    pub table: String,
    /// Record identifier.
    pub id: RecordId,
    /// Entity fields.
    pub fields: Fields,
    /// Reconciliation state.
    pub sync_status: SyncStatus,
    /// When the remote last acknowledged this record.
    pub last_synced_at: Option<Timestamp>,
    /// Last permanent sync failure, if any.
    pub sync_error: Option<String>,
    /// When the record was last changed locally.
    pub locally_modified_at: Option<Timestamp>,
    /// Deleted locally; kept until the remote delete is confirmed.
    #[serde(default)]
    pub deleted: bool,
}

impl CachedRecord {
    /// Creates a record in the `Synced` state, as if just loaded from the
    /// remote store.
    pub fn synced(table: impl Into<String>, id: RecordId, mut fields: Fields) -> Self {
        fields.insert(ID_FIELD.to_owned(), Value::String(id.to_string()));
        Self {
            table: table.into(),
            id,
            fields,
            sync_status: SyncStatus::Synced,
            last_synced_at: None,
            sync_error: None,
            locally_modified_at: None,
            deleted: false,
        }
    }

    /// Creates a locally written record in the `Pending` state.
    pub fn pending(
        table: impl Into<String>,
        id: RecordId,
        mut fields: Fields,
        now: Timestamp,
    ) -> Self {
        fields.insert(ID_FIELD.to_owned(), Value::String(id.to_string()));
        Self {
            table: table.into(),
            id,
            fields,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
            sync_error: None,
            locally_modified_at: Some(now),
            deleted: false,
        }
    }

    /// Returns a field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns true if a local change is waiting to be synced.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::Pending
    }

    /// Returns true if the record is live (not a local tombstone).
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.deleted
    }

    /// Marks the record as locally changed.
    pub fn mark_pending(&mut self, now: Timestamp) {
        self.sync_status = SyncStatus::Pending;
        self.locally_modified_at = Some(now);
        self.sync_error = None;
    }

    /// Marks the record as acknowledged by the remote.
    pub fn mark_synced(&mut self, now: Timestamp) {
        self.sync_status = SyncStatus::Synced;
        self.last_synced_at = Some(now);
        self.sync_error = None;
    }

    /// Marks the record as permanently failed.
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.sync_status = SyncStatus::Error;
        self.sync_error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn constructors_embed_id_field() {
        let record = CachedRecord::synced(
            "notes",
            RecordId::from("n1"),
            fields(json!({"content": "Pack sunscreen"})),
        );
        assert_eq!(record.field("id"), Some(&json!("n1")));
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert!(record.is_live());
    }

    #[test]
    fn status_transitions() {
        let now = Utc::now();
        let mut record =
            CachedRecord::pending("notes", RecordId::from("n1"), Fields::new(), now);
        assert!(record.is_pending());
        assert_eq!(record.locally_modified_at, Some(now));

        record.mark_error("permission denied");
        assert_eq!(record.sync_status, SyncStatus::Error);
        assert_eq!(record.sync_error.as_deref(), Some("permission denied"));

        record.mark_pending(now);
        assert!(record.sync_error.is_none());

        record.mark_synced(now);
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.last_synced_at, Some(now));
    }
}
