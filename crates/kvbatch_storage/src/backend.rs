//! The backend trait.

use crate::error::StorageResult;

/// An append-only byte log.
///
/// The write-ahead log of a KVBatch store sits on top of one of these. Bytes
/// are only ever added at the end; the single exception is [`truncate`],
/// which recovery uses to cut off a torn tail left by a crash mid-append.
///
/// # Invariants
///
/// - `append` returns the offset its first byte landed at
/// - `read_at` returns exactly the bytes previously appended at that range
/// - after `sync` returns, everything appended so far survives a crash
///
/// [`truncate`]: StorageBackend::truncate
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not
    /// entirely inside the log, or an I/O error.
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

    /// Forces all appended data and metadata to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Current size of the log in bytes; the offset of the next append.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Cuts the log down to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] if `new_size` is
    /// larger than the log, or an I/O error.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
