//! Core type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wall-clock timestamp used for modification and sync times.
pub type Timestamp = DateTime<Utc>;

/// The mutable part of a record: a JSON object keyed by field name.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Name of the field that carries a record's identifier inside [`Fields`].
pub const ID_FIELD: &str = "id";

/// Identifier of a record within its table.
///
/// Ids are opaque strings so they can match whatever the remote store uses
/// as a primary key. Locally generated ids are UUID v4.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generates a new random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Monotonic identifier assigned to a queue entry.
///
/// Ids are never reused, so they double as the FIFO position of an entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct QueueEntryId(pub u64);

impl QueueEntryId {
    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueueEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q:{}", self.0)
    }
}

/// Reconciliation state of a cached record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local state matches what the remote last acknowledged.
    Synced,
    /// A local change is queued and not yet acknowledged.
    Pending,
    /// The queued change failed permanently and needs manual attention.
    Error,
}

impl SyncStatus {
    /// Returns the lowercase name used in logs and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_uuids() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn record_id_serializes_as_plain_string() {
        let id = RecordId::from("n1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"n1\"");
        assert_eq!(format!("{id}"), "n1");
    }

    #[test]
    fn status_names() {
        assert_eq!(SyncStatus::Pending.to_string(), "pending");
        assert_eq!(
            serde_json::to_string(&SyncStatus::Error).unwrap(),
            "\"error\""
        );
    }
}
