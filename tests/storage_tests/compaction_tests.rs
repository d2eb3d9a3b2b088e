//! Tests for size-tiered compaction
//!
//! These tests verify:
//! - Run selection (similar sizes, thresholds, table-count bound)
//! - Merged data is identical to the pre-compaction view
//! - Tombstones are kept unless the run reaches the oldest table
//! - Compacted state survives reopening

use std::collections::BTreeMap;

use hurmadb::config::CompactionPolicy;
use hurmadb::memtable::{MemTable, MemTableEntry};
use hurmadb::storage::{select_compaction, StorageManager};
use tempfile::TempDir;

fn flush(storage: &StorageManager, puts: &[(&str, &str)], deletes: &[&str]) {
    let table = MemTable::new();
    for (k, v) in puts {
        table.put(k.as_bytes().to_vec(), v.as_bytes().to_vec());
    }
    for k in deletes {
        table.delete(k.as_bytes().to_vec());
    }
    storage.flush(&table).unwrap();
}

/// Live records as seen through the storage manager
fn live_view(storage: &StorageManager) -> BTreeMap<Vec<u8>, Vec<u8>> {
    storage
        .range(b"", b"\xff")
        .unwrap()
        .into_iter()
        .filter_map(|(k, e)| e.into_value().map(|v| (k, v)))
        .collect()
}

// =============================================================================
// Selection
// =============================================================================

#[test]
fn test_selects_run_of_similar_sizes() {
    let policy = CompactionPolicy::default();

    assert_eq!(select_compaction(&[100, 100, 100], &policy), None);
    assert_eq!(select_compaction(&[100, 110, 90, 100], &policy), Some(0..4));

    // A large newest table breaks the bucket; the run starts after it
    assert_eq!(
        select_compaction(&[1000, 100, 100, 100, 100], &policy),
        Some(1..5)
    );

    // An outlier in the middle splits the tables into two short runs
    assert_eq!(
        select_compaction(&[100, 100, 5000, 100, 100], &policy),
        None
    );
}

#[test]
fn test_run_is_capped_at_max_threshold() {
    let policy = CompactionPolicy {
        max_threshold: 4,
        ..CompactionPolicy::default()
    };
    assert_eq!(select_compaction(&[100; 6], &policy), Some(0..4));
}

#[test]
fn test_too_many_tables_merges_everything() {
    let policy = CompactionPolicy {
        max_tables: 3,
        ..CompactionPolicy::default()
    };
    let sizes = [1, 1000, 1, 100_000];
    assert_eq!(select_compaction(&sizes, &policy), Some(0..4));
}

// =============================================================================
// Merge
// =============================================================================

#[test]
fn test_compaction_preserves_the_view() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path()).unwrap();

    flush(&storage, &[("a", "1"), ("b", "1"), ("c", "1")], &[]);
    flush(&storage, &[("b", "2"), ("d", "2")], &["a"]);
    flush(&storage, &[("a", "3"), ("e", "3")], &["c"]);
    flush(&storage, &[("f", "4")], &["d"]);
    let before = live_view(&storage);

    let stats = storage.compact_all().unwrap().unwrap();

    assert_eq!(stats.input_tables, 4);
    assert_eq!(storage.sstable_ids(), vec![4]);
    assert_eq!(live_view(&storage), before);
    // Full merge reaches the oldest table, so no tombstone survives;
    // the tombstone for "a" is shadowed by a newer value instead
    assert_eq!(stats.dropped_tombstones, 2);
    assert!(stats.dropped_versions >= 3);
    assert_eq!(stats.output_entries as usize, before.len());

    drop(storage);
    let reopened = StorageManager::open(temp.path()).unwrap();
    assert_eq!(reopened.sstable_ids(), vec![4]);
    assert_eq!(live_view(&reopened), before);
}

#[test]
fn test_partial_run_keeps_tombstones() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path()).unwrap();

    // Oldest table is much larger than the rest, so it stays out of the run
    let big = "x".repeat(16 * 1024);
    flush(&storage, &[("doomed", big.as_str()), ("keep", big.as_str())], &[]);
    flush(&storage, &[("a", "1")], &["doomed"]);
    flush(&storage, &[("b", "1"), ("b2", "1")], &[]);
    flush(&storage, &[("c", "1"), ("c2", "1")], &[]);
    flush(&storage, &[("d", "1"), ("d2", "1")], &[]);

    let stats = storage
        .maybe_compact(&CompactionPolicy::default())
        .unwrap()
        .unwrap();

    assert_eq!(stats.input_tables, 4);
    assert_eq!(stats.dropped_tombstones, 0);
    assert_eq!(storage.sstable_ids(), vec![5, 1]);

    // The surviving tombstone still hides the value in the oldest table
    assert_eq!(
        storage.get_entry(b"doomed").unwrap(),
        Some(MemTableEntry::Tombstone)
    );
    assert_eq!(storage.get(b"keep").unwrap(), Some(big.into_bytes()));
}

#[test]
fn test_nothing_to_compact() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path()).unwrap();

    assert_eq!(storage.compact_all().unwrap(), None);
    flush(&storage, &[("a", "1")], &[]);
    assert_eq!(storage.compact_all().unwrap(), None);
    assert_eq!(
        storage.maybe_compact(&CompactionPolicy::default()).unwrap(),
        None
    );
}
