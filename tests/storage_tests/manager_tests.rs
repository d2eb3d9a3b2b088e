//! Tests for StorageManager
//!
//! These tests verify:
//! - Flushes create SSTables searched newest → oldest
//! - Range reads merge tables with newest-wins
//! - Reopen restores tables and the id counter
//! - Leftovers from interrupted flushes/compactions are cleaned on open

use hurmadb::memtable::{MemTable, MemTableEntry};
use hurmadb::storage::{SSTableBuilder, StorageManager};
use tempfile::TempDir;

fn memtable(puts: &[(&str, &str)], deletes: &[&str]) -> MemTable {
    let table = MemTable::new();
    for (k, v) in puts {
        table.put(k.as_bytes().to_vec(), v.as_bytes().to_vec());
    }
    for k in deletes {
        table.delete(k.as_bytes().to_vec());
    }
    table
}

// =============================================================================
// Flush and Read
// =============================================================================

#[test]
fn test_flush_creates_sstable() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path()).unwrap();
    assert_eq!(storage.sstable_count(), 0);
    assert_eq!(storage.next_sstable_id(), 1);

    let meta = storage.flush(&memtable(&[("a", "1"), ("b", "2")], &[])).unwrap();

    assert_eq!(meta.entry_count, 2);
    assert!(meta.path.exists());
    assert_eq!(storage.sstable_ids(), vec![1]);
    assert_eq!(storage.get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_flush_rejects_empty_memtable() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path()).unwrap();
    assert!(storage.flush(&MemTable::new()).is_err());
    assert_eq!(storage.sstable_count(), 0);
}

#[test]
fn test_newest_table_wins() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path()).unwrap();

    storage.flush(&memtable(&[("k", "old"), ("x", "1")], &[])).unwrap();
    storage.flush(&memtable(&[("k", "new")], &[])).unwrap();
    storage.flush(&memtable(&[], &["x"])).unwrap();

    assert_eq!(storage.sstable_ids(), vec![3, 2, 1]);
    assert_eq!(storage.get(b"k").unwrap(), Some(b"new".to_vec()));
    assert_eq!(storage.get_entry(b"x").unwrap(), Some(MemTableEntry::Tombstone));
    assert_eq!(storage.get(b"x").unwrap(), None);
}

#[test]
fn test_range_merges_tables() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path()).unwrap();

    storage
        .flush(&memtable(&[("a", "1"), ("b", "1"), ("c", "1")], &[]))
        .unwrap();
    storage.flush(&memtable(&[("b", "2")], &["c"])).unwrap();

    let merged = storage.range(b"a", b"c").unwrap();
    assert_eq!(merged.get(b"a".as_slice()), Some(&MemTableEntry::Value(b"1".to_vec())));
    assert_eq!(merged.get(b"b".as_slice()), Some(&MemTableEntry::Value(b"2".to_vec())));
    assert_eq!(merged.get(b"c".as_slice()), Some(&MemTableEntry::Tombstone));

    assert!(storage.range(b"c", b"a").unwrap().is_empty());
}

// =============================================================================
// Reopen and Cleanup
// =============================================================================

#[test]
fn test_reopen_restores_tables_and_ids() {
    let temp = TempDir::new().unwrap();
    {
        let storage = StorageManager::open(temp.path()).unwrap();
        storage.flush(&memtable(&[("a", "1")], &[])).unwrap();
        storage.flush(&memtable(&[("b", "2")], &[])).unwrap();
    }

    let storage = StorageManager::open(temp.path()).unwrap();
    assert_eq!(storage.sstable_ids(), vec![2, 1]);
    assert_eq!(storage.next_sstable_id(), 3);
    assert_eq!(storage.get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_open_removes_temp_files() {
    let temp = TempDir::new().unwrap();
    let leftover = temp.path().join("sstable_000007.sst.tmp");
    std::fs::write(&leftover, b"half written").unwrap();

    let storage = StorageManager::open(temp.path()).unwrap();

    assert!(!leftover.exists());
    assert_eq!(storage.sstable_count(), 0);
}

#[test]
fn test_open_removes_tables_superseded_by_compaction() {
    let temp = TempDir::new().unwrap();
    {
        let storage = StorageManager::open(temp.path()).unwrap();
        storage.flush(&memtable(&[("a", "1")], &[])).unwrap();
        storage.flush(&memtable(&[("a", "2"), ("b", "2")], &[])).unwrap();
        storage.flush(&memtable(&[("c", "3")], &[])).unwrap();
    }

    // A compaction of tables 1..=2 that crashed after renaming its output
    // over id 2 but before deleting table 1
    let merged = StorageManager::sstable_path_with_dir(temp.path(), 2);
    let mut builder = SSTableBuilder::covering(&merged, 1).unwrap();
    builder.add(b"a", b"2").unwrap();
    builder.add(b"b", b"2").unwrap();
    builder.finish().unwrap();

    let storage = StorageManager::open(temp.path()).unwrap();

    assert_eq!(storage.sstable_ids(), vec![3, 2]);
    assert!(!StorageManager::sstable_path_with_dir(temp.path(), 1).exists());
    assert_eq!(storage.get(b"a").unwrap(), Some(b"2".to_vec()));
    assert_eq!(storage.get(b"c").unwrap(), Some(b"3".to_vec()));
}
