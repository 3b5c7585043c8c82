//! Error types for the store and backups.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the store, its transactions and backups.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] kvbatch_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] kvbatch_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The write-ahead log is corrupted or invalid.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored alongside the data.
        expected: u32,
        /// Checksum computed over the data.
        actual: u32,
    },

    /// Invalid on-disk or backup format.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Another process holds the store directory lock.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The store has been closed.
    #[error("store is closed")]
    StoreClosed,

    /// The store was opened read-only.
    #[error("store is read-only")]
    ReadOnly,

    /// Keys must contain at least one byte.
    #[error("empty key")]
    EmptyKey,

    /// Key exceeds the configured limit.
    #[error("key of {size} bytes exceeds limit of {limit} bytes")]
    KeyTooLarge {
        /// Key size in bytes.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Value exceeds the configured limit.
    #[error("value of {size} bytes exceeds limit of {limit} bytes")]
    ValueTooLarge {
        /// Value size in bytes.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A transaction already holds the maximum number of pending writes.
    #[error("transaction too big: limit of {limit} entries reached")]
    TransactionTooBig {
        /// Configured entry limit.
        limit: usize,
    },

    /// A key read by the transaction was committed by someone else since.
    #[error("transaction conflict on key {key:?}")]
    TransactionConflict {
        /// The conflicting key.
        key: Vec<u8>,
    },

    /// A directory could not be created.
    #[error("cannot create directory {}: {source}", path.display())]
    DirectoryCreate {
        /// The directory path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A file could not be created.
    #[error("cannot create file {}: {source}", path.display())]
    FileCreate {
        /// The file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
