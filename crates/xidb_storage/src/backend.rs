//! The byte-store contract.

use crate::error::StorageResult;

/// An append-oriented byte store.
///
/// The record log writes frames with [`append`](Self::append), replays them
/// with [`read_at`](Self::read_at), cuts torn tails with
/// [`truncate`](Self::truncate), and swaps in a compacted image with
/// [`rewrite`](Self::rewrite).
///
/// # Invariants
///
/// - `append` returns the offset of the first written byte, which equals the
///   previous `size()`
/// - `read_at` returns exactly the bytes previously written at that range
/// - after `sync` returns, everything appended so far survives a crash
/// - `rewrite` is all-or-nothing: readers see either the old or the new image
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// when the range extends beyond `size()`, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the number of bytes stored, which is also the next append offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes all appended bytes and the store's length durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops every byte at or after `new_size`.
    ///
    /// Used during recovery to cut a partially written final frame.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is larger than the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the entire contents with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the new image cannot be written; the old image is
    /// left intact in that case.
    fn rewrite(&mut self, data: &[u8]) -> StorageResult<()>;
}
