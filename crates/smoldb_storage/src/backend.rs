//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level storage backend for SmolDB.
///
/// Backends are opaque byte stores addressed by absolute offset. SmolDB
/// owns all format interpretation — backends never see slot headers or
/// index entries, only byte ranges.
///
/// # Invariants
///
/// - `read_at` returns exactly the bytes most recently written to that
///   range
/// - `write_at` may extend the store; bytes between the old end and the
///   write offset read as zero
/// - after `replace`, the store contains exactly the given bytes and
///   nothing else
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::StorageError::ReadPastEnd`] if the range extends
    /// beyond the current size, or on I/O errors.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` at `offset`, extending the store if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Flushes buffered writes to the underlying store.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Truncates the store to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` exceeds the current size or the truncation
    /// fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the entire contents with `data`.
    ///
    /// For file-backed stores this writes a sibling temp file and renames
    /// it over the original, so a crash leaves either the old or the new
    /// contents, never a mixture.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement fails; the previous contents
    /// remain intact in that case.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
