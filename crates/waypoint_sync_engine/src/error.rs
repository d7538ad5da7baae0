//! Error types for the sync engine.

use thiserror::Error;
use waypoint_core::CoreError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, SyncError>;

/// Errors that abort an engine operation.
///
/// Remote failures never show up here during a drain: they are recorded per
/// entry in the [`SyncResult`](crate::SyncResult). Only local storage
/// problems stop a drain.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local cache or queue error.
    #[error("store error: {0}")]
    Store(#[from] CoreError),

    /// Remote store error outside a drain.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// A drain task panicked or was cancelled.
    #[error("drain task failed: {0}")]
    Task(String),
}

/// Failure reported by a remote data store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// An insert hit an existing primary key.
    #[error("duplicate key: {table}/{id}")]
    DuplicateKey {
        /// Target table.
        table: String,
        /// Record id.
        id: String,
    },

    /// The target record does not exist remotely.
    #[error("record not found: {table}/{id}")]
    NotFound {
        /// Target table.
        table: String,
        /// Record id.
        id: String,
    },

    /// Any other failure, described by the backend's message.
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Creates an error from a backend message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
