//! Write-ahead log.
//!
//! The WAL is the store's only persistent state. A commit appends the
//! transaction's `Set` records followed by its `Commit` marker in a single
//! write; opening a store replays the log and applies only transactions whose
//! marker made it to disk.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Recovery Policy
//!
//! - A truncated header or payload at the end of the log is a torn write and
//!   is discarded (the file is truncated back to the last complete record).
//! - Bad magic, an unknown type, an unsupported version or a CRC mismatch is
//!   corruption and the store refuses to open.
//! - A length field that runs past the end of the log is only a torn write
//!   if no complete record follows it; otherwise it is corruption.

mod record;
mod writer;

pub use record::{WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
pub use writer::{ReplayStats, WalManager};
