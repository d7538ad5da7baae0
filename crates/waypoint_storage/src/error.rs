//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the journal.
    #[error("read beyond end of journal: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current journal size.
        size: u64,
    },

    /// Attempted to truncate to a size larger than the journal.
    #[error("cannot truncate journal of {size} bytes to {requested} bytes")]
    TruncateBeyondEnd {
        /// The requested size.
        requested: u64,
        /// The current journal size.
        size: u64,
    },
}
