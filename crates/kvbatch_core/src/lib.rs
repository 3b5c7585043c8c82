//! # KVBatch Core
//!
//! Bulk ingestion and backup over an embedded ordered key-value store.
//!
//! This crate provides:
//! - [`Store`]: an ordered key-value store rebuilt from a write-ahead log,
//!   with concurrent write transactions and consistent snapshots
//! - [`pipeline`]: the batched write pipeline that turns a line stream into
//!   bounded transactions committed by a worker pool
//! - [`backup`]: streaming full and incremental backups, and restore
//!
//! ```rust
//! use kvbatch_core::pipeline::{BatchWriter, KeyValue, PipelineConfig};
//! use kvbatch_core::Store;
//!
//! let store = Store::open_in_memory().unwrap();
//! let mapper = |line: &str| -> Result<KeyValue<String, String>, String> {
//!     let (key, value) = line.split_once(',').ok_or("expected key,value")?;
//!     Ok(KeyValue::new(key.to_string(), value.to_string()))
//! };
//!
//! BatchWriter::new(&store, mapper, PipelineConfig::default())
//!     .write_stream("a,1\nb,2\n".as_bytes())
//!     .unwrap();
//! assert_eq!(store.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backup;
mod config;
mod crc;
mod dir;
mod error;
pub mod pipeline;
mod store;
mod transaction;
mod types;
pub mod wal;

pub use backup::{create_backup, restore_backup, BackupMetadata, BackupReport};
pub use config::{
    StoreConfig, DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_TXN_ENTRIES, DEFAULT_MAX_VALUE_SIZE,
};
pub use crc::{compute_crc32, Crc32};
pub use dir::{LockMode, StoreDir};
pub use error::{CoreError, CoreResult};
pub use store::{EntryRef, LoadStats, Snapshot, Store, StoreStats};
pub use transaction::WriteTransaction;
pub use types::{TransactionId, Version};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
