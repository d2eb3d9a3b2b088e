//! Configuration for HurmaDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Default PostgreSQL port; listening here selects the Postgres front end.
pub const POSTGRES_PORT: u16 = 5432;

/// Main configuration for a HurmaDB instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (WAL, SSTables, etc.)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     └── sstables/        (SSTable files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------
    /// Longest accepted key (in bytes)
    pub max_key_size: usize,

    /// Largest accepted value (in bytes)
    pub max_value_size: usize,

    // -------------------------------------------------------------------------
    // Concurrency
    // -------------------------------------------------------------------------
    /// Number of striped mutation locks (same-key writers share a stripe)
    pub lock_stripes: usize,

    // -------------------------------------------------------------------------
    // Compaction
    // -------------------------------------------------------------------------
    pub compaction: CompactionPolicy,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent Postgres client connections
    pub max_connections: usize,

    /// Postgres connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Postgres connection write timeout (milliseconds)
    pub write_timeout_ms: u64,

    /// Upper bound on how long either front end runs before re-checking
    /// the termination latch (milliseconds)
    pub accept_poll_interval_ms: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries. Writes acknowledged between syncs
    /// can be lost on power failure.
    EveryNEntries { count: usize },
}

/// Size-tiered compaction settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionPolicy {
    /// Smallest run of similarly-sized SSTables worth merging
    pub min_threshold: usize,

    /// Largest number of SSTables merged in one tiered compaction
    pub max_threshold: usize,

    /// A table joins a run if its size is >= bucket_low * run average...
    pub bucket_low: f64,

    /// ...and <= bucket_high * run average
    pub bucket_high: f64,

    /// Space amplification bound: past this many SSTables everything is merged
    pub max_tables: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            min_threshold: 4,
            max_threshold: 32,
            bucket_low: 0.5,
            bucket_high: 1.5,
            max_tables: 16,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./hurmadb_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            max_key_size: 1024,
            max_value_size: 16 * 1024 * 1024, // 16 MB
            lock_stripes: 64,
            compaction: CompactionPolicy::default(),
            listen_addr: "127.0.0.1:8080".to_string(),
            max_connections: 1024,
            read_timeout_ms: 30_000,
            write_timeout_ms: 5000,
            accept_poll_interval_ms: 50,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the maximum key size (in bytes)
    pub fn max_key_size(mut self, size: usize) -> Self {
        self.config.max_key_size = size;
        self
    }

    /// Set the maximum value size (in bytes)
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.config.max_value_size = size;
        self
    }

    /// Set the number of striped mutation locks (minimum 1)
    pub fn lock_stripes(mut self, count: usize) -> Self {
        self.config.lock_stripes = count.max(1);
        self
    }

    /// Set the compaction policy
    pub fn compaction(mut self, policy: CompactionPolicy) -> Self {
        self.config.compaction = policy;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the accept loop's latch poll interval (in milliseconds)
    pub fn accept_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.accept_poll_interval_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
