//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for queue draining.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Attempts before an entry is permanently failed.
    pub max_retries: u32,
    /// Interval between background drains while online.
    pub sync_interval: Duration,
    /// Remote field holding the last-modified time (RFC 3339), used for
    /// conflict detection on updates.
    pub modified_at_field: String,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            sync_interval: Duration::from_secs(30),
            modified_at_field: "updated_at".into(),
        }
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the background drain interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the remote last-modified field name.
    pub fn with_modified_at_field(mut self, field: impl Into<String>) -> Self {
        self.modified_at_field = field.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
