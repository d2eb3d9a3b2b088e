//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Validate keys and values before anything is written
//! - Coordinate WAL, MemTable, and Storage
//! - Serialize same-key mutations without a global write lock
//! - Trigger flushes and compactions
//! - Manage crash recovery on startup

use std::fs;
use std::path::Path;

use parking_lot::{Mutex, RwLock};

use crate::codec::encode_range;
use crate::command::{Command, Outcome, Record};
use crate::config::Config;
use crate::error::Result;
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::{CompactionStats, StorageManager};
use crate::validation::{validate_key, validate_value};
use crate::wal::{CommitLog, Operation, WalRecovery};

/// The main storage engine
///
/// ## Concurrency Model: striped writers, lock-free-ish readers
///
/// - **Mutations** (set/del): take the flush gate in shared mode plus the
///   stripe lock chosen by the key's CRC32. Two writers contend only if
///   their keys share a stripe. The WAL append and the memtable update for
///   a key both happen under its stripe lock, so per-key WAL order matches
///   per-key memtable order. The WAL mutex itself covers only the append;
///   the fsync is shared by every writer waiting at that moment (see
///   [`CommitLog`]).
///
/// - **Flush**: takes the flush gate exclusively, so it never observes a
///   mutation that is logged but not yet in the memtable.
///
/// - **Reads** (get/get_range): no engine locks. The memtable is consulted
///   before the SSTables; a flush publishes its SSTable before clearing the
///   memtable, so a read never misses a flushed record.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Write-ahead log for durability
    wal: CommitLog,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Shared by mutations, exclusive for flush
    flush_gate: RwLock<()>,

    /// Per-key mutation locks, selected by hash
    stripes: Vec<Mutex<()>>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Load existing SSTables (checksums verified)
    /// 3. Recover from WAL if it exists, flush the recovered records and
    ///    truncate the WAL
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        fs::create_dir_all(&storage_dir)?;

        let storage = StorageManager::open(&storage_dir)?;
        let memtable = MemTable::new();

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                    recovery.entries_recovered,
                    recovery.entries_corrupted,
                    recovery.last_lsn
                );
            }

            for entry in entries {
                match entry.operation {
                    Operation::Put { key, value } => {
                        memtable.put(key, value);
                    }
                    Operation::Delete { key } => {
                        memtable.delete(key);
                    }
                }
            }

            // Make the recovered records durable in an SSTable before the
            // WAL that holds them is truncated
            if !memtable.is_empty() {
                tracing::info!(
                    "Flushing {} recovered entries to SSTable",
                    memtable.entry_count()
                );
                storage.flush(&memtable)?;
                memtable.clear();
            }
        }

        let wal = CommitLog::open(&wal_path, config.wal_sync_strategy)?;
        wal.truncate()?;

        let stripes = (0..config.lock_stripes.max(1))
            .map(|_| Mutex::new(()))
            .collect();

        tracing::info!(
            "Engine opened at {} with {} SSTables",
            config.data_dir.display(),
            storage.sstable_count()
        );

        Ok(Self {
            config,
            wal,
            memtable,
            storage,
            flush_gate: RwLock::new(()),
            stripes,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Execute a command
    ///
    /// Routes commands to appropriate handlers
    pub fn execute(&self, command: Command) -> Result<Outcome> {
        match command {
            Command::Get { key } => self.get(&key).map(Outcome::Value),
            Command::Set { key, value } => {
                self.set(&key, &value)?;
                Ok(Outcome::Stored)
            }
            Command::Del { key } => self.del(&key).map(Outcome::Deleted),
            Command::GetRange { from, to } => self.get_range(&from, &to).map(Outcome::Records),
        }
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    ///
    /// A key that fails validation can never have been stored: `None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if validate_key(key, self.config.max_key_size).is_err() {
            return Ok(None);
        }
        Ok(self.lookup(key)?.and_then(MemTableEntry::into_value))
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<MemTableEntry>> {
        if let Some(entry) = self.memtable.get(key) {
            return Ok(Some(entry));
        }
        self.storage.get_entry(key)
    }

    /// Create or overwrite a record
    ///
    /// Steps:
    /// 1. Validate (a failure returns `Validation` and writes nothing)
    /// 2. Acquire flush gate (shared) and the key's stripe lock
    /// 3. Write to WAL (durability)
    /// 4. Write to MemTable
    /// 5. Flush if the MemTable is full
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        validate_key(key, self.config.max_key_size)?;
        validate_value(value, self.config.max_value_size)?;

        let new_size = {
            let _gate = self.flush_gate.read();
            let _stripe = self.stripe(key).lock();

            self.wal.commit(Operation::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            })?;

            self.memtable.put(key.to_vec(), value.to_vec())
        };

        self.flush_if_full(new_size);
        Ok(())
    }

    /// Delete a record
    ///
    /// Returns whether the key existed. Deleting an absent key writes
    /// nothing and returns `false`.
    pub fn del(&self, key: &[u8]) -> Result<bool> {
        if validate_key(key, self.config.max_key_size).is_err() {
            return Ok(false);
        }

        let new_size = {
            let _gate = self.flush_gate.read();
            let _stripe = self.stripe(key).lock();

            let exists = matches!(self.lookup(key)?, Some(MemTableEntry::Value(_)));
            if !exists {
                return Ok(false);
            }

            self.wal.commit(Operation::Delete { key: key.to_vec() })?;
            self.memtable.delete(key.to_vec())
        };

        self.flush_if_full(new_size);
        Ok(true)
    }

    /// All live records with `key_from <= key <= key_to`, ascending
    ///
    /// Both bounds are inclusive; `key_from > key_to` yields nothing.
    pub fn get_range(&self, key_from: &[u8], key_to: &[u8]) -> Result<Vec<Record>> {
        if key_from > key_to {
            return Ok(Vec::new());
        }

        // MemTable before SSTables, see the struct docs
        let recent = self.memtable.range(key_from, key_to);
        let mut merged = self.storage.range(key_from, key_to)?;
        merged.extend(recent);

        Ok(merged
            .into_iter()
            .filter_map(|(key, entry)| entry.into_value().map(|value| (key, value)))
            .collect())
    }

    /// [`get_range`](Self::get_range) encoded as one response body
    pub fn get_range_serialized(&self, key_from: &[u8], key_to: &[u8]) -> Result<Vec<u8>> {
        Ok(encode_range(&self.get_range(key_from, key_to)?))
    }

    fn stripe(&self, key: &[u8]) -> &Mutex<()> {
        let hash = crc32fast::hash(key) as usize;
        &self.stripes[hash % self.stripes.len()]
    }

    /// Post-write flush; the write itself is already durable in the WAL, so
    /// a failure here is logged rather than reported to the writer
    fn flush_if_full(&self, size: usize) {
        let limit = self.config.memtable_size_limit;
        if size < limit {
            return;
        }
        if let Err(e) = self.flush_at_least(limit) {
            tracing::error!("MemTable flush failed, records remain in the WAL: {}", e);
        }
    }

    /// Flush memtable to disk, then run a compaction if one is due
    ///
    /// A no-op when the memtable is empty.
    pub fn flush(&self) -> Result<()> {
        self.flush_at_least(0)
    }

    /// Flush only if the memtable still holds `min_size` bytes once the gate
    /// is held; concurrent writers that all crossed the limit flush once
    fn flush_at_least(&self, min_size: usize) -> Result<()> {
        let flushed = {
            let _gate = self.flush_gate.write();
            if self.memtable.size() < min_size {
                return Ok(());
            }
            self.flush_internal()?
        };

        if flushed {
            if let Err(e) = self.storage.maybe_compact(&self.config.compaction) {
                tracing::error!("Compaction failed: {}", e);
            }
        }
        Ok(())
    }

    /// Internal flush implementation (called with the flush gate held)
    fn flush_internal(&self) -> Result<bool> {
        if self.memtable.is_empty() {
            return Ok(false);
        }

        // Publish the SSTable before clearing, so readers never miss a record
        self.storage.flush(&self.memtable)?;
        self.memtable.clear();

        // Entries are now durable in the SSTable
        self.wal.truncate()?;

        Ok(true)
    }

    /// Merge every SSTable into one, dropping tombstones
    pub fn compact(&self) -> Result<Option<CompactionStats>> {
        self.storage.compact_all()
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk
    pub fn close(self) -> Result<()> {
        self.flush()?;
        self.wal.sync()?;
        tracing::info!("Engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// fsyncs performed on behalf of waiting writers
    pub fn wal_sync_count(&self) -> u64 {
        self.wal.sync_count()
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
