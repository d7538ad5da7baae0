//! # Waypoint Sync Engine
//!
//! Drains the Waypoint sync queue into an authoritative remote store.
//!
//! This crate provides:
//! - The drain loop with FIFO ordering and per-entry retry accounting
//! - Error classification (network, conflict, permission, validation)
//! - Last-write-wins conflict reporting on updates
//! - The remote store abstraction and a per-table repository registry
//! - An in-memory remote store for tests
//! - A tokio background worker driven by connectivity, a timer and manual
//!   triggers
//!
//! ## Delivery guarantees
//!
//! Delivery is at least once. The engine makes repeats harmless:
//! - An insert that hits an existing row is retried as an update
//! - A delete of a missing row counts as success
//! - An entry re-edited during a drain stays queued for the next one

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classify;
mod config;
mod engine;
mod error;
mod memory;
pub mod normalize;
mod remote;
mod result;
mod worker;

pub use classify::{classify, classify_message, ErrorKind};
pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncState, SyncStats};
pub use error::{EngineResult, RemoteError, SyncError};
pub use memory::{MemoryRemoteStore, RemoteCall, RemoteOp};
pub use remote::{RemoteDataStore, RemoteRepository, RemoteResult, RepositoryRegistry};
pub use result::{ConflictRecord, SyncErrorDetail, SyncResult};
pub use worker::SyncWorker;
