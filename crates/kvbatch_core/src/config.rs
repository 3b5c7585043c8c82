//! Store configuration.

/// Default limit on key size, matching common LSM engines.
pub const DEFAULT_MAX_KEY_SIZE: usize = 65_000;

/// Default limit on value size (1 GiB).
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1 << 30;

/// Default limit on pending writes in one transaction.
pub const DEFAULT_MAX_TXN_ENTRIES: usize = 1_000_000;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Open with a shared lock and reject writes.
    pub read_only: bool,

    /// Whether to fsync the WAL on every commit (safer but slower).
    ///
    /// When false the WAL is only flushed to the OS on commit.
    pub sync_on_commit: bool,

    /// Maximum key size in bytes.
    pub max_key_size: usize,

    /// Maximum value size in bytes.
    pub max_value_size: usize,

    /// Maximum number of pending writes a transaction may hold.
    pub max_txn_entries: usize,

    /// Number of entries applied per WAL append while loading a backup.
    pub load_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            read_only: false,
            sync_on_commit: true,
            max_key_size: DEFAULT_MAX_KEY_SIZE,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            max_txn_entries: DEFAULT_MAX_TXN_ENTRIES,
            load_batch_size: 1_000,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for read-only access to an existing store.
    #[must_use]
    pub fn read_only() -> Self {
        Self::default().create_if_missing(false).with_read_only(true)
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub const fn with_read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets whether to fsync the WAL on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the maximum key size.
    #[must_use]
    pub const fn max_key_size(mut self, size: usize) -> Self {
        self.max_key_size = size;
        self
    }

    /// Sets the maximum value size.
    #[must_use]
    pub const fn max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = size;
        self
    }

    /// Sets the maximum number of pending writes per transaction.
    #[must_use]
    pub const fn max_txn_entries(mut self, entries: usize) -> Self {
        self.max_txn_entries = entries;
        self
    }

    /// Sets how many backup entries are applied per WAL append on load.
    #[must_use]
    pub const fn load_batch_size(mut self, entries: usize) -> Self {
        self.load_batch_size = entries;
        self
    }
}
