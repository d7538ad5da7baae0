//! Test fixtures and store helpers.
//!
//! Provides travel-planner entities, their schema, and harnesses that wire a
//! local store, an enqueuer and a sync engine against an in-memory remote.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use waypoint_core::{
    CachedRecord, Config, Entity, Fields, LocalCache, LocalStore, MutationEnqueuer, RecordId,
    Schema, TableSchema,
};
use waypoint_sync_engine::{MemoryRemoteStore, SyncConfig, SyncEngine};

/// A trip: the parent of every other entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Record id.
    pub id: RecordId,
    /// Display title.
    pub title: String,
    /// First day (ISO date).
    pub start_date: String,
    /// Last day (ISO date).
    pub end_date: String,
}

impl Entity for Trip {
    const TABLE: &'static str = "trips";

    fn record_id(&self) -> RecordId {
        self.id.clone()
    }
}

/// A free-text note attached to a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Record id.
    pub id: RecordId,
    /// Owning trip.
    pub trip_id: RecordId,
    /// Note text.
    pub content: String,
}

impl Entity for Note {
    const TABLE: &'static str = "notes";

    fn record_id(&self) -> RecordId {
        self.id.clone()
    }
}

/// An expense on a given day of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// Record id.
    pub id: RecordId,
    /// Owning trip.
    pub trip_id: RecordId,
    /// Amount in minor units.
    pub amount_cents: i64,
    /// ISO currency code.
    pub currency: String,
    /// Day of the expense (ISO date).
    pub date: String,
}

impl Entity for Expense {
    const TABLE: &'static str = "expenses";

    fn record_id(&self) -> RecordId {
        self.id.clone()
    }
}

/// A planned activity with an optional structured location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Record id.
    pub id: RecordId,
    /// Owning trip.
    pub trip_id: RecordId,
    /// Activity name.
    pub name: String,
    /// Day of the activity (ISO date).
    pub date: String,
    /// Structured location, e.g. `{"lat": .., "lng": ..}`.
    #[serde(default)]
    pub location: Option<Value>,
}

impl Entity for Activity {
    const TABLE: &'static str = "activities";

    fn record_id(&self) -> RecordId {
        self.id.clone()
    }
}

/// Schema for the travel-planner tables.
pub fn travel_schema() -> Schema {
    Schema::new()
        .table(TableSchema::new(Trip::TABLE))
        .table(TableSchema::new(Note::TABLE).index("trip_id"))
        .table(
            TableSchema::new(Expense::TABLE)
                .index("trip_id")
                .compound_index(["trip_id", "date"]),
        )
        .table(
            TableSchema::new(Activity::TABLE)
                .index("trip_id")
                .compound_index(["trip_id", "date"]),
        )
}

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<LocalStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store with the travel schema.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(
                LocalStore::open_in_memory(travel_schema()).expect("Failed to open in-memory store"),
            ),
            _temp_dir: None,
        }
    }

    /// Creates a file-backed store in a temporary directory.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// Creates a file-backed store with custom configuration.
    pub fn file_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = LocalStore::open_with_config(temp_dir.path(), travel_schema(), config)
            .expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-based.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Returns an enqueuer writing to this store.
    pub fn enqueuer(&self) -> MutationEnqueuer<LocalStore> {
        MutationEnqueuer::new(Arc::clone(&self.store))
    }
}

impl std::ops::Deref for TestStore {
    type Target = LocalStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&LocalStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary file-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&LocalStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("File store should have a path");
    f(&test_store.store, path)
}

/// Engine type used by the harness.
pub type MemoryEngine = SyncEngine<LocalStore, MemoryRemoteStore>;

/// A local store, enqueuer, in-memory remote and engine wired together.
pub struct SyncHarness {
    /// Local store.
    pub store: Arc<LocalStore>,
    /// Write path into `store`.
    pub enqueuer: MutationEnqueuer<LocalStore>,
    /// Authoritative remote.
    pub remote: Arc<MemoryRemoteStore>,
    /// Engine draining `store` into `remote`.
    pub engine: Arc<MemoryEngine>,
    _temp_dir: Option<TempDir>,
}

impl SyncHarness {
    /// Creates a harness over an in-memory store.
    pub fn memory() -> Self {
        Self::memory_with_config(SyncConfig::default())
    }

    /// Creates an in-memory harness with custom engine configuration.
    pub fn memory_with_config(config: SyncConfig) -> Self {
        let store =
            LocalStore::open_in_memory(travel_schema()).expect("Failed to open in-memory store");
        Self::assemble(store, Arc::new(MemoryRemoteStore::new()), config, None)
    }

    /// Creates a harness over a file-backed store.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store =
            LocalStore::open(temp_dir.path(), travel_schema()).expect("Failed to open file store");
        Self::assemble(
            store,
            Arc::new(MemoryRemoteStore::new()),
            SyncConfig::default(),
            Some(temp_dir),
        )
    }

    fn assemble(
        store: LocalStore,
        remote: Arc<MemoryRemoteStore>,
        config: SyncConfig,
        temp_dir: Option<TempDir>,
    ) -> Self {
        let store = Arc::new(store);
        let engine = Arc::new(SyncEngine::new(config, Arc::clone(&store), Arc::clone(&remote)));
        Self {
            enqueuer: MutationEnqueuer::new(Arc::clone(&store)),
            store,
            remote,
            engine,
            _temp_dir: temp_dir,
        }
    }

    /// Simulates an app restart: closes the store and reopens it from its
    /// directory, keeping the same remote.
    ///
    /// Panics for in-memory harnesses.
    pub fn restart(self) -> Self {
        let Self {
            store,
            enqueuer,
            remote,
            engine,
            _temp_dir: temp_dir,
        } = self;
        let config = engine.config().clone();
        drop(engine);
        drop(enqueuer);
        drop(store);

        let temp_dir = temp_dir.expect("Only file harnesses can restart");
        let store =
            LocalStore::open(temp_dir.path(), travel_schema()).expect("Failed to reopen store");
        Self::assemble(store, remote, config, Some(temp_dir))
    }

    /// Live local records of `table`, ordered by id.
    pub fn local_view(&self, table: &str) -> Vec<Fields> {
        self.store
            .query(table, &CachedRecord::is_live)
            .expect("Failed to query store")
            .into_iter()
            .map(|record| record.fields)
            .collect()
    }

    /// Remote records of `table` without the modified-at stamp, ordered by id.
    pub fn remote_view(&self, table: &str) -> Vec<Fields> {
        let field = &self.engine.config().modified_at_field;
        self.remote
            .records(table)
            .into_iter()
            .map(|mut record| {
                record.remove(field);
                record
            })
            .collect()
    }

    /// Returns true if the remote holds exactly the local live set for every
    /// listed table.
    pub fn converged(&self, tables: &[&str]) -> bool {
        tables
            .iter()
            .all(|table| self.local_view(table) == self.remote_view(table))
    }
}

/// Sample entities.
pub mod samples {
    use super::*;
    use serde_json::json;

    /// A trip with a fixed id.
    pub fn trip(id: &str) -> Trip {
        Trip {
            id: RecordId::from(id),
            title: "Lisbon".into(),
            start_date: "2024-06-01".into(),
            end_date: "2024-06-07".into(),
        }
    }

    /// A note on `trip`.
    pub fn note(id: &str, trip: &Trip, content: &str) -> Note {
        Note {
            id: RecordId::from(id),
            trip_id: trip.id.clone(),
            content: content.into(),
        }
    }

    /// An expense on `trip`.
    pub fn expense(id: &str, trip: &Trip, date: &str, amount_cents: i64) -> Expense {
        Expense {
            id: RecordId::from(id),
            trip_id: trip.id.clone(),
            amount_cents,
            currency: "EUR".into(),
            date: date.into(),
        }
    }

    /// An activity on `trip` with a structured location.
    pub fn activity(id: &str, trip: &Trip, date: &str, name: &str) -> Activity {
        Activity {
            id: RecordId::from(id),
            trip_id: trip.id.clone(),
            name: name.into(),
            date: date.into(),
            location: Some(json!({ "lat": 38.7223, "lng": -9.1393 })),
        }
    }
}
