//! Storage Manager
//!
//! Manages multiple SSTables and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup, dropping ones a compaction superseded
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Merge SSTables (size-tiered compaction)

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::CompactionPolicy;
use crate::error::{HurmaError, Result};
use crate::memtable::{MemTable, MemTableEntry};

use super::compaction::{select_compaction, CompactionStats, MergeIterator};
use super::{SSTable, SSTableBuilder, SSTableReader};

/// An open SSTable and the id encoded in its file name
#[derive(Clone)]
struct TableHandle {
    id: u64,
    reader: Arc<SSTableReader>,
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: RwLock over a list of `Arc` handles; readers clone the list
///   and release the lock before touching files
/// - Each reader serializes access to its own file handle
/// - `next_sstable_id`: Atomic counter (lock-free)
/// - `compaction_lock`: at most one compaction at a time
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<TableHandle>>,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,

    compaction_lock: Mutex<()>,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Remove leftover temporary files from interrupted compactions
    /// 3. Open readers for each SSTable (validates checksums, loads indexes)
    /// 4. Delete tables superseded by a compacted table
    /// 5. Order by ID descending (newest first)
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut sstable_ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if !file_path.is_file() {
                continue;
            }
            if Self::is_temp_file(&file_path) {
                tracing::info!("Removing incomplete SSTable {}", file_path.display());
                fs::remove_file(&file_path)?;
                continue;
            }
            if let Some(id) = Self::parse_sstable_id(&file_path) {
                sstable_ids.push(id);
            }
        }

        // Newest first (highest ID first)
        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut tables = Vec::with_capacity(sstable_ids.len());
        for &id in &sstable_ids {
            let reader = SSTableReader::open(&Self::sstable_path_with_dir(path, id))?;
            tables.push(TableHandle {
                id,
                reader: Arc::new(reader),
            });
        }

        // A merged table with covers_from = c and id = n replaces ids [c, n)
        let obsolete: HashSet<u64> = tables
            .iter()
            .filter(|t| t.reader.covers_from() > 0)
            .flat_map(|t| {
                let (from, to) = (t.reader.covers_from(), t.id);
                sstable_ids.iter().copied().filter(move |&id| id >= from && id < to)
            })
            .collect();

        if !obsolete.is_empty() {
            tables.retain(|t| !obsolete.contains(&t.id));
            for id in &obsolete {
                tracing::info!("Removing SSTable {} superseded by compaction", id);
                fs::remove_file(Self::sstable_path_with_dir(path, *id))?;
            }
            sync_dir(path)?;
        }

        // Next ID = max + 1, or 1 if no SSTables exist
        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(tables),
            next_sstable_id: AtomicU64::new(next_id),
            compaction_lock: Mutex::new(()),
        })
    }

    fn snapshot(&self) -> Vec<TableHandle> {
        self.sstables.read().clone()
    }

    /// Get the newest entry for a key across all SSTables
    ///
    /// Returns:
    /// - `Ok(Some(Value(v)))` — key found with value
    /// - `Ok(Some(Tombstone))` — key deleted
    /// - `Ok(None)` — no SSTable mentions the key
    pub fn get_entry(&self, key: &[u8]) -> Result<Option<MemTableEntry>> {
        for table in self.snapshot() {
            // Skip SSTable if key is outside its range (O(1) check)
            if !table.reader.might_contain(key) {
                continue;
            }
            if let Some(entry) = table.reader.get(key)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Get a live value by key (tombstones read as absent)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get_entry(key)?.and_then(MemTableEntry::into_value))
    }

    /// Newest entry per key with `from <= key <= to`, tombstones included
    pub fn range(&self, from: &[u8], to: &[u8]) -> Result<BTreeMap<Vec<u8>, MemTableEntry>> {
        let mut merged = BTreeMap::new();
        if from > to {
            return Ok(merged);
        }

        // Oldest first so newer tables overwrite
        for table in self.snapshot().iter().rev() {
            if !table.reader.overlaps(from, to) {
                continue;
            }
            for (key, entry) in table.reader.range(from, to)? {
                merged.insert(key, entry);
            }
        }
        Ok(merged)
    }

    /// Flush a MemTable to a new SSTable
    ///
    /// Creates a new SSTable file from the MemTable's sorted entries,
    /// opens a reader for it, and adds it to the front of the list.
    pub fn flush(&self, memtable: &MemTable) -> Result<SSTable> {
        if memtable.is_empty() {
            return Err(HurmaError::Storage(
                "Cannot flush empty MemTable".to_string(),
            ));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let tmp_path = self.temp_path(id);
        let path = self.sstable_path(id);

        // Entries are already sorted (BTreeMap)
        let mut builder = SSTableBuilder::new(&tmp_path)?;
        for (key, entry) in memtable.iter() {
            match entry {
                MemTableEntry::Value(v) => builder.add(&key, &v)?,
                MemTableEntry::Tombstone => builder.add_tombstone(&key)?,
            }
        }
        let mut metadata = builder.finish()?;
        fs::rename(&tmp_path, &path)?;
        sync_dir(&self.data_dir)?;
        metadata.path = path.clone();

        let reader = Arc::new(SSTableReader::open(&path)?);
        self.sstables.write().insert(0, TableHandle { id, reader });

        tracing::debug!(
            "Flushed {} entries to SSTable {} ({} bytes)",
            metadata.entry_count,
            id,
            metadata.file_size
        );
        Ok(metadata)
    }

    /// Run a size-tiered compaction if the policy selects a run
    ///
    /// Returns `Ok(None)` when nothing qualified or another compaction is
    /// already in progress.
    pub fn maybe_compact(&self, policy: &CompactionPolicy) -> Result<Option<CompactionStats>> {
        let Some(_guard) = self.compaction_lock.try_lock() else {
            return Ok(None);
        };

        let tables = self.snapshot();
        let sizes: Vec<u64> = tables.iter().map(|t| t.reader.file_size()).collect();
        match select_compaction(&sizes, policy) {
            Some(run) => {
                let drops_tombstones = run.end == tables.len();
                self.merge(&tables[run], drops_tombstones).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Merge every SSTable into one, dropping tombstones
    pub fn compact_all(&self) -> Result<Option<CompactionStats>> {
        let _guard = self.compaction_lock.lock();

        let tables = self.snapshot();
        if tables.len() < 2 {
            return Ok(None);
        }
        self.merge(&tables, true).map(Some)
    }

    /// Merge a contiguous newest → oldest run into one table
    ///
    /// The output takes the newest id in the run. It is written under a
    /// temporary name, fsynced, renamed into place, and only then are the
    /// older inputs deleted; a crash in between is repaired by `open`.
    fn merge(&self, run: &[TableHandle], drop_tombstones: bool) -> Result<CompactionStats> {
        let (Some(newest), Some(oldest)) = (run.first(), run.last()) else {
            return Err(HurmaError::Storage("empty compaction run".to_string()));
        };
        let target_id = newest.id;
        let covers_from = oldest.id;

        let iterators = run
            .iter()
            .map(|t| t.reader.iter())
            .collect::<Result<Vec<_>>>()?;
        let mut merge = MergeIterator::new(iterators)?;

        let tmp_path = self.temp_path(target_id);
        let mut builder = SSTableBuilder::covering(&tmp_path, covers_from)?;
        let mut dropped_tombstones = 0;

        for item in merge.by_ref() {
            match item? {
                (key, MemTableEntry::Value(v)) => builder.add(&key, &v)?,
                (_, MemTableEntry::Tombstone) if drop_tombstones => dropped_tombstones += 1,
                (key, MemTableEntry::Tombstone) => builder.add_tombstone(&key)?,
            }
        }
        let metadata = builder.finish()?;

        let final_path = self.sstable_path(target_id);
        fs::rename(&tmp_path, &final_path)?;
        sync_dir(&self.data_dir)?;

        let reader = Arc::new(SSTableReader::open(&final_path)?);
        let merged_ids: HashSet<u64> = run.iter().map(|t| t.id).collect();
        {
            let mut tables = self.sstables.write();
            tables.retain(|t| !merged_ids.contains(&t.id));
            let pos = tables
                .iter()
                .position(|t| t.id < target_id)
                .unwrap_or(tables.len());
            tables.insert(pos, TableHandle { id: target_id, reader });
        }

        for id in merged_ids.iter().filter(|&&id| id != target_id) {
            // Open readers keep the data alive until their last user drops them
            if let Err(e) = fs::remove_file(self.sstable_path(*id)) {
                tracing::warn!("Failed to remove compacted SSTable {}: {}", id, e);
            }
        }

        let stats = CompactionStats {
            input_tables: run.len(),
            output_entries: metadata.entry_count,
            dropped_tombstones,
            dropped_versions: merge.shadowed,
        };
        tracing::info!(
            "Compacted SSTables {}..={} into {}: {:?}",
            covers_from,
            target_id,
            target_id,
            stats
        );
        Ok(stats)
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Ids of open SSTables, newest first
    pub fn sstable_ids(&self) -> Vec<u64> {
        self.sstables.read().iter().map(|t| t.id).collect()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Generate the file path for an SSTable with given ID
    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    /// Generate SSTable path given a directory and ID
    pub fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    fn temp_path(&self, id: u64) -> PathBuf {
        self.data_dir.join(format!("sstable_{:06}.sst.tmp", id))
    }

    fn is_temp_file(path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == "tmp")
    }

    /// Parse SSTable ID from filename
    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("sstable_")?;
        id_str.parse().ok()
    }
}

/// Persist directory entries (new files, renames, removals)
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
