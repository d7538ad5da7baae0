//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte log backing the Waypoint journal.
///
/// # Invariants
///
/// - `append` returns the offset the data was written at
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `sync` returns, everything appended so far survives a crash
/// - `replace` is all-or-nothing: readers see either the old or the new image
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range extends past
    /// the current size.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads the whole log.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        self.read_at(0, size as usize)
    }

    /// Appends data to the end of the log and returns its offset.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current size in bytes, which is where the next append lands.
    fn size(&self) -> StorageResult<u64>;

    /// Makes all appended data durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Cuts the log back to `new_size` bytes.
    ///
    /// Used on recovery to drop a torn trailing frame.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the entire log with `data`.
    ///
    /// Used by compaction to swap in a checkpoint image.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
