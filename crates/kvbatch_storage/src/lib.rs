//! # KVBatch Storage
//!
//! Append-only byte logs underneath the KVBatch store.
//!
//! A backend knows nothing about the records written into it. The store's
//! write-ahead log frames, checksums and replays its own records; a backend
//! only has to append bytes, hand them back by offset, and make them durable.
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - ephemeral stores and tests
//! - [`FileBackend`] - a single file on the local file system
//!
//! ## Example
//!
//! ```rust
//! use kvbatch_storage::{MemoryBackend, StorageBackend};
//!
//! let mut log = MemoryBackend::new();
//! let offset = log.append(b"set k v").unwrap();
//! assert_eq!(log.read_at(offset, 7).unwrap(), b"set k v");
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
pub use memory::MemoryBackend;
