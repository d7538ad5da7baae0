//! Remote data store abstraction.

use crate::error::RemoteError;
use std::collections::HashMap;
use std::sync::Arc;
use waypoint_core::{Fields, RecordId};

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// The authoritative backend the queue is drained into.
///
/// Calls are synchronous and must be safe to repeat: the engine delivers
/// at least once.
pub trait RemoteDataStore: Send + Sync {
    /// Creates a record. `record` carries the `"id"` field.
    fn insert(&self, table: &str, record: &Fields) -> RemoteResult<()>;

    /// Overwrites a record's fields.
    fn update(&self, table: &str, id: &RecordId, fields: &Fields) -> RemoteResult<()>;

    /// Removes a record.
    fn delete(&self, table: &str, id: &RecordId) -> RemoteResult<()>;

    /// Reads a record, if present.
    fn fetch(&self, table: &str, id: &RecordId) -> RemoteResult<Option<Fields>>;

    /// Reshapes a queued payload before it is sent.
    fn normalize(&self, _table: &str, payload: Fields) -> Fields {
        payload
    }
}

/// Remote access for a single entity kind.
pub trait RemoteRepository: Send + Sync {
    /// Creates a record.
    fn insert(&self, record: &Fields) -> RemoteResult<()>;

    /// Overwrites a record's fields.
    fn update(&self, id: &RecordId, fields: &Fields) -> RemoteResult<()>;

    /// Removes a record.
    fn delete(&self, id: &RecordId) -> RemoteResult<()>;

    /// Reads a record, if present.
    fn fetch(&self, id: &RecordId) -> RemoteResult<Option<Fields>>;

    /// Reshapes a queued payload before it is sent.
    fn normalize(&self, payload: Fields) -> Fields {
        payload
    }
}

/// Routes remote calls to a per-table [`RemoteRepository`].
///
/// A table without a registered repository fails with an "unknown table"
/// error, which classifies as a validation failure and is not retried.
#[derive(Default, Clone)]
pub struct RepositoryRegistry {
    repositories: HashMap<String, Arc<dyn RemoteRepository>>,
}

impl RepositoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `repository` for `table`, replacing any previous one.
    pub fn register(&mut self, table: impl Into<String>, repository: Arc<dyn RemoteRepository>) {
        self.repositories.insert(table.into(), repository);
    }

    /// Builder form of [`RepositoryRegistry::register`].
    #[must_use]
    pub fn with(mut self, table: impl Into<String>, repository: Arc<dyn RemoteRepository>) -> Self {
        self.register(table, repository);
        self
    }

    /// Registered table names, sorted.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.repositories.keys().map(String::as_str).collect();
        tables.sort_unstable();
        tables
    }

    fn repository(&self, table: &str) -> RemoteResult<&Arc<dyn RemoteRepository>> {
        self.repositories
            .get(table)
            .ok_or_else(|| RemoteError::other(format!("unknown table: {table}")))
    }
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("tables", &self.tables())
            .finish()
    }
}

impl RemoteDataStore for RepositoryRegistry {
    fn insert(&self, table: &str, record: &Fields) -> RemoteResult<()> {
        self.repository(table)?.insert(record)
    }

    fn update(&self, table: &str, id: &RecordId, fields: &Fields) -> RemoteResult<()> {
        self.repository(table)?.update(id, fields)
    }

    fn delete(&self, table: &str, id: &RecordId) -> RemoteResult<()> {
        self.repository(table)?.delete(id)
    }

    fn fetch(&self, table: &str, id: &RecordId) -> RemoteResult<Option<Fields>> {
        self.repository(table)?.fetch(id)
    }

    fn normalize(&self, table: &str, payload: Fields) -> Fields {
        match self.repositories.get(table) {
            Some(repository) => repository.normalize(payload),
            None => payload,
        }
    }
}
