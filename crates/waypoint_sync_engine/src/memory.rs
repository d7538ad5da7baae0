//! In-memory remote store for tests and demos.

use crate::error::RemoteError;
use crate::remote::{RemoteDataStore, RemoteResult};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use waypoint_core::{Fields, RecordId, Timestamp, ID_FIELD};

/// Kind of remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// `insert`
    Insert,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `fetch`
    Fetch,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Fetch => "fetch",
        };
        f.write_str(name)
    }
}

/// One logged remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    /// Call kind.
    pub op: RemoteOp,
    /// Target table.
    pub table: String,
    /// Target record.
    pub id: RecordId,
}

/// An in-memory authoritative store.
///
/// Logs every call, stamps writes with a last-modified time, and can be
/// scripted to fail. While disconnected every call fails with a network
/// error.
pub struct MemoryRemoteStore {
    tables: RwLock<HashMap<String, BTreeMap<RecordId, Fields>>>,
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<HashMap<(String, RemoteOp), VecDeque<RemoteError>>>,
    connected: AtomicBool,
    latency: Mutex<Duration>,
    modified_at_field: String,
}

impl MemoryRemoteStore {
    /// Creates an empty, connected store stamping `updated_at`.
    pub fn new() -> Self {
        Self::with_modified_at_field("updated_at")
    }

    /// Creates a store stamping writes into `field`.
    pub fn with_modified_at_field(field: impl Into<String>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
            modified_at_field: field.into(),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns true if calls currently reach the store.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Makes the next `op` on `table` fail with `error`. Failures queue up.
    pub fn fail_next(&self, table: impl Into<String>, op: RemoteOp, error: RemoteError) {
        self.failures
            .lock()
            .entry((table.into(), op))
            .or_default()
            .push_back(error);
    }

    /// Makes the next `times` calls of `op` on `table` fail with `error`.
    pub fn fail_times(&self, table: &str, op: RemoteOp, error: RemoteError, times: usize) {
        for _ in 0..times {
            self.fail_next(table, op, error.clone());
        }
    }

    /// Inserts a record directly, bypassing the call log.
    ///
    /// Keeps an existing modified-at value, otherwise stamps the current
    /// time.
    pub fn seed(&self, table: &str, mut record: Fields) {
        let Some(id) = record.get(ID_FIELD).and_then(Value::as_str).map(RecordId::from) else {
            return;
        };
        if !record.contains_key(&self.modified_at_field) {
            self.stamp(&mut record, Utc::now());
        }
        self.tables
            .write()
            .entry(table.to_owned())
            .or_default()
            .insert(id, record);
    }

    /// Sets a record's modified-at time, simulating a write by another
    /// client.
    pub fn touch(&self, table: &str, id: &RecordId, at: Timestamp) {
        let mut tables = self.tables.write();
        if let Some(record) = tables.get_mut(table).and_then(|t| t.get_mut(id)) {
            record.insert(
                self.modified_at_field.clone(),
                Value::String(at.to_rfc3339()),
            );
        }
    }

    /// Returns a stored record.
    pub fn get(&self, table: &str, id: &RecordId) -> Option<Fields> {
        self.tables.read().get(table).and_then(|t| t.get(id)).cloned()
    }

    /// Returns all records of a table, ordered by id.
    pub fn records(&self, table: &str) -> Vec<Fields> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records in a table.
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Returns the call log.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    /// Counts logged calls of one kind.
    pub fn call_count(&self, op: RemoteOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    /// Clears the call log.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn stamp(&self, record: &mut Fields, at: Timestamp) {
        record.insert(
            self.modified_at_field.clone(),
            Value::String(at.to_rfc3339()),
        );
    }

    /// Logs the call and applies latency and scripted failures.
    fn begin(&self, op: RemoteOp, table: &str, id: &RecordId) -> RemoteResult<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        self.calls.lock().push(RemoteCall {
            op,
            table: table.to_owned(),
            id: id.clone(),
        });

        if !self.is_connected() {
            return Err(RemoteError::other("network unreachable: client is offline"));
        }
        let scripted = self
            .failures
            .lock()
            .get_mut(&(table.to_owned(), op))
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryRemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRemoteStore")
            .field("connected", &self.is_connected())
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

fn record_id(table: &str, record: &Fields) -> RemoteResult<RecordId> {
    record
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .map(RecordId::from)
        .ok_or_else(|| RemoteError::other(format!("invalid record for {table}: missing id")))
}

impl RemoteDataStore for MemoryRemoteStore {
    fn insert(&self, table: &str, record: &Fields) -> RemoteResult<()> {
        let id = record_id(table, record)?;
        self.begin(RemoteOp::Insert, table, &id)?;

        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_owned()).or_default();
        if rows.contains_key(&id) {
            return Err(RemoteError::DuplicateKey {
                table: table.to_owned(),
                id: id.to_string(),
            });
        }
        let mut row = record.clone();
        self.stamp(&mut row, Utc::now());
        rows.insert(id, row);
        Ok(())
    }

    fn update(&self, table: &str, id: &RecordId, fields: &Fields) -> RemoteResult<()> {
        self.begin(RemoteOp::Update, table, id)?;

        let mut tables = self.tables.write();
        let Some(row) = tables.get_mut(table).and_then(|t| t.get_mut(id)) else {
            return Err(RemoteError::NotFound {
                table: table.to_owned(),
                id: id.to_string(),
            });
        };
        for (key, value) in fields {
            row.insert(key.clone(), value.clone());
        }
        self.stamp(row, Utc::now());
        Ok(())
    }

    fn delete(&self, table: &str, id: &RecordId) -> RemoteResult<()> {
        self.begin(RemoteOp::Delete, table, id)?;

        let removed = self
            .tables
            .write()
            .get_mut(table)
            .and_then(|t| t.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound {
                table: table.to_owned(),
                id: id.to_string(),
            }),
        }
    }

    fn fetch(&self, table: &str, id: &RecordId) -> RemoteResult<Option<Fields>> {
        self.begin(RemoteOp::Fetch, table, id)?;
        Ok(self.get(table, id))
    }
}
