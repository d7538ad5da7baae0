//! # Waypoint Core
//!
//! Client-side half of an offline-first sync subsystem: a durable local
//! cache, the sync queue, and the optimistic write path.
//!
//! Every local mutation is applied to the cache immediately and recorded
//! in the queue as one atomic journal write. The queue keeps at most one
//! entry per record, merging successive offline edits so the remote store
//! only sees the net effect. `waypoint_sync_engine` drains the queue.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use waypoint_core::{LocalStore, MutationEnqueuer, Schema, SyncObserver, SyncStore, TableSchema};
//!
//! let schema = Schema::new().table(TableSchema::new("notes").index("trip_id"));
//! let store = Arc::new(LocalStore::open_in_memory(schema)?);
//! let enqueuer = MutationEnqueuer::new(Arc::clone(&store));
//!
//! let note = enqueuer.create("notes", json!({ "trip_id": "t1", "content": "Pack sunscreen" }))?;
//! enqueuer.update("notes", &note.id, json!({ "content": "Pack sunscreen and hats" }))?;
//!
//! // Two offline edits, one queued insert.
//! assert_eq!(store.queue_len()?, 1);
//! assert!(store.is_pending_sync("notes", &note.id)?);
//! # Ok::<(), waypoint_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod dir;
mod enqueuer;
mod entity;
mod error;
pub mod journal;
mod observer;
mod queue;
mod record;
mod schema;
mod store;
mod table;
mod types;

pub use cache::{LocalCache, SyncStore};
pub use config::Config;
pub use enqueuer::MutationEnqueuer;
pub use entity::Entity;
pub use error::{CoreError, CoreResult};
pub use observer::SyncObserver;
pub use queue::{
    merge_operations, EnqueueOutcome, EnqueueRequest, MergeDecision, Operation, QueueEntry,
    SyncQueue,
};
pub use record::CachedRecord;
pub use schema::{IndexDef, IndexKey, Schema, TableSchema};
pub use store::{LocalStore, StoreStats, TableStats};
pub use types::{Fields, QueueEntryId, RecordId, SyncStatus, Timestamp, ID_FIELD};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
