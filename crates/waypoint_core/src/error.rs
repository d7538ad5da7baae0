//! Error types for Waypoint core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the local cache, sync queue and write path.
///
/// None of these originate from the remote store: the optimistic write path
/// only fails on local grounds.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] waypoint_storage::StorageError),

    /// I/O error outside the storage backend (directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A journal frame could not be encoded or decoded.
    #[error("journal codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The journal contains an unreadable frame before its tail.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Offset of the bad frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Record not found (or only present as a local tombstone).
    #[error("record not found: {table}/{id}")]
    RecordNotFound {
        /// Table searched.
        table: String,
        /// Record id.
        id: String,
    },

    /// A live record with this id already exists.
    #[error("record already exists: {table}/{id}")]
    RecordExists {
        /// Table of the record.
        table: String,
        /// Record id.
        id: String,
    },

    /// Payload is not usable as a record.
    #[error("invalid payload for {table}: {message}")]
    InvalidPayload {
        /// Table the payload was meant for.
        table: String,
        /// What is wrong with it.
        message: String,
    },

    /// No secondary index with this name is declared for the table.
    #[error("unknown index {index} on table {table}")]
    UnknownIndex {
        /// Table queried.
        table: String,
        /// Index name.
        index: String,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The store directory is missing and creation was not requested.
    #[error("store not found: {path}")]
    StoreNotFound {
        /// Expected directory.
        path: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(table: &str, id: impl ToString) -> Self {
        Self::RecordNotFound {
            table: table.to_owned(),
            id: id.to_string(),
        }
    }

    /// Creates an invalid-payload error.
    pub fn invalid_payload(table: &str, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            table: table.to_owned(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::not_found("notes", "n1");
        assert_eq!(err.to_string(), "record not found: notes/n1");

        let err = CoreError::StoreLocked;
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn storage_error_converts() {
        let storage = waypoint_storage::StorageError::ReadPastEnd {
            offset: 4,
            len: 8,
            size: 6,
        };
        let err: CoreError = storage.into();
        assert!(matches!(err, CoreError::Storage(_)));
    }
}
