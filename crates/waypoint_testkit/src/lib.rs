//! # Waypoint Testkit
//!
//! Test utilities for Waypoint.
//!
//! This crate provides:
//! - Travel-planner entity fixtures and schema
//! - Store and sync harnesses over memory or temp directories
//! - Property-based mutation generators using proptest
//! - Journal crash recovery checks
//!
//! ## Usage
//!
//! ```rust
//! use waypoint_testkit::prelude::*;
//! use serde_json::json;
//!
//! let harness = SyncHarness::memory();
//! harness.enqueuer.create("notes", json!({ "trip_id": "t1", "content": "Pack sunscreen" }))?;
//! harness.engine.drain()?;
//! assert!(harness.converged(&["notes"]));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
