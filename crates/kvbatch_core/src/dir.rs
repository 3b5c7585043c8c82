//! Store directory management.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK       # advisory lock: exclusive for writers, shared for readers
//! └─ wal.log    # write-ahead log, the only persistent state
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const WAL_FILE: &str = "wal.log";

/// Lock mode taken on the store directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Single writer; no other handle may be open.
    Exclusive,
    /// Any number of readers, no writer.
    Shared,
}

/// An opened store directory holding its lock.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    mode: LockMode,
    _lock_file: File,
}

impl StoreDir {
    /// Opens (and optionally creates) the directory and takes its lock.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DirectoryCreate`] if the directory cannot be created
    /// - [`CoreError::InvalidFormat`] if it is missing and `create_if_missing`
    ///   is false, or the path is not a directory
    /// - [`CoreError::StoreLocked`] if the lock is held incompatibly
    pub fn open(path: &Path, create_if_missing: bool, mode: LockMode) -> CoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(CoreError::invalid_format(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path).map_err(|source| CoreError::DirectoryCreate {
                path: path.to_path_buf(),
                source,
            })?;
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        // fs2 takes shared locks on read-only handles, so readers of an
        // existing store need no write access to it.
        let lock_file = if mode == LockMode::Shared && lock_path.is_file() {
            File::open(&lock_path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?
        };

        let locked = match mode {
            LockMode::Exclusive => FileExt::try_lock_exclusive(&lock_file),
            LockMode::Shared => FileExt::try_lock_shared(&lock_file),
        };
        if locked.is_err() {
            return Err(CoreError::StoreLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            _lock_file: lock_file,
        })
    }

    /// Path of the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock mode held on the directory.
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Path of the write-ahead log.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.path.join(WAL_FILE)
    }
}
