//! # Waypoint Storage
//!
//! Byte-level storage for the Waypoint local journal.
//!
//! A backend is an opaque, append-only byte log. It knows nothing about
//! journal frames, cached records or queue entries; `waypoint_core` owns
//! that format and only asks the backend to append, read back, cut off a
//! torn tail, and atomically swap in a compacted image.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests and throwaway stores
//! - [`FileBackend`] - a single journal file on disk
//!
//! ## Example
//!
//! ```rust
//! use waypoint_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"frame-1").unwrap();
//! backend.append(b"frame-2").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"frame-1frame-2");
//!
//! backend.replace(b"snapshot").unwrap();
//! assert_eq!(backend.size().unwrap(), 8);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
