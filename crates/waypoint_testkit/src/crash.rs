//! Crash recovery testing for the local store journal.
//!
//! A crash can cut the journal at any byte. Recovery must come back with
//! exactly the state of the last complete frame: never half a mutation, so
//! a record and its queue entry always agree.
//!
//! ## Test Strategy
//!
//! 1. Apply a mutation sequence to a file store, snapshotting the state and
//!    journal length after each mutation.
//! 2. Cut a copy of the journal at every frame boundary and in the middle of
//!    every frame.
//! 3. Reopen each copy and compare it with the snapshot of the longest
//!    committed prefix.

use crate::fixtures::travel_schema;
use crate::generators::{apply_mutation, Mutation};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use waypoint_core::{
    CachedRecord, Config, LocalCache, LocalStore, MutationEnqueuer, QueueEntry, SyncStore,
};

const JOURNAL_FILE: &str = "journal.log";

/// Cache and queue contents at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    /// All records, tombstones included, ordered by table then id.
    pub records: Vec<CachedRecord>,
    /// Queue entries in FIFO order.
    pub entries: Vec<QueueEntry>,
}

impl StoreSnapshot {
    /// Captures the current contents of `store`.
    pub fn capture(store: &LocalStore) -> Self {
        let mut records = Vec::new();
        for table in store.table_names() {
            records.extend(
                store
                    .query(&table, &|_: &CachedRecord| true)
                    .expect("Failed to query store"),
            );
        }
        Self {
            records,
            entries: store.queue_snapshot().expect("Failed to read queue"),
        }
    }
}

/// Result of reopening one truncated journal.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Journal length the copy was cut to.
    pub cut_at: u64,
    /// Whether recovery matched the expected snapshot.
    pub passed: bool,
    /// Any error message.
    pub error: Option<String>,
}

/// Replays mutations and checks recovery at every crash point.
pub struct CrashRecoveryHarness {
    source: TempDir,
    checkpoints: Vec<(u64, StoreSnapshot)>,
}

impl CrashRecoveryHarness {
    /// Applies `mutations` to a fresh file store, recording a checkpoint
    /// after each one.
    pub fn record(mutations: &[Mutation]) -> Self {
        let source = TempDir::new().expect("Failed to create temp directory");
        // No compaction: the journal must stay a plain sequence of frames.
        let config = Config::default().compact_threshold(0);
        let store = Arc::new(
            LocalStore::open_with_config(source.path(), travel_schema(), config)
                .expect("Failed to open store"),
        );
        let enqueuer = MutationEnqueuer::new(Arc::clone(&store));

        let mut checkpoints = vec![(0, StoreSnapshot::capture(&store))];
        for mutation in mutations {
            apply_mutation(&enqueuer, mutation).expect("Mutation failed");
            let len = store.journal_size().expect("Failed to read journal size");
            if checkpoints.last().map(|(l, _)| *l) != Some(len) {
                checkpoints.push((len, StoreSnapshot::capture(&store)));
            }
        }

        Self {
            source,
            checkpoints,
        }
    }

    /// Byte offsets to cut at: each frame boundary and each frame midpoint.
    pub fn crash_points(&self) -> Vec<u64> {
        let mut points = Vec::new();
        for pair in self.checkpoints.windows(2) {
            let (start, end) = (pair[0].0, pair[1].0);
            points.push(start);
            points.push(start + (end - start) / 2);
        }
        if let Some((last, _)) = self.checkpoints.last() {
            points.push(*last);
        }
        points
    }

    /// Reopens a copy of the journal cut at `cut_at` and compares it with the
    /// expected snapshot.
    pub fn check(&self, cut_at: u64) -> CrashRecoveryResult {
        let expected = self
            .checkpoints
            .iter()
            .rev()
            .find(|(len, _)| *len <= cut_at)
            .map(|(_, snapshot)| snapshot);

        let outcome = (|| -> Result<bool, String> {
            let bytes = fs::read(self.source.path().join(JOURNAL_FILE)).map_err(|e| e.to_string())?;
            let cut = usize::try_from(cut_at).map_err(|e| e.to_string())?;
            let target = TempDir::new().map_err(|e| e.to_string())?;
            fs::write(target.path().join(JOURNAL_FILE), &bytes[..cut.min(bytes.len())])
                .map_err(|e| e.to_string())?;

            let store =
                LocalStore::open(target.path(), travel_schema()).map_err(|e| e.to_string())?;
            let recovered = StoreSnapshot::capture(&store);
            Ok(expected == Some(&recovered))
        })();

        match outcome {
            Ok(passed) => CrashRecoveryResult {
                cut_at,
                passed,
                error: (!passed).then(|| "recovered state differs from checkpoint".to_string()),
            },
            Err(error) => CrashRecoveryResult {
                cut_at,
                passed: false,
                error: Some(error),
            },
        }
    }

    /// Checks every crash point.
    pub fn run_all(&self) -> Vec<CrashRecoveryResult> {
        self.crash_points()
            .into_iter()
            .map(|cut| self.check(cut))
            .collect()
    }
}
