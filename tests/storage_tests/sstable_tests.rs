//! Tests for SSTable build/read
//!
//! These tests verify:
//! - Building and reading back values and tombstones
//! - Inclusive range reads
//! - Sorted-order enforcement in the builder
//! - Checksum and header validation on open

use std::path::PathBuf;

use hurmadb::memtable::MemTableEntry;
use hurmadb::storage::{SSTableBuilder, SSTableReader};
use hurmadb::HurmaError;
use tempfile::TempDir;

fn setup() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sstable_000001.sst");
    (temp_dir, path)
}

/// a=1, b=<tombstone>, c=3, ..., built in order
fn build_sample(path: &PathBuf) {
    let mut builder = SSTableBuilder::new(path).unwrap();
    builder.add(b"a", b"1").unwrap();
    builder.add_tombstone(b"b").unwrap();
    builder.add(b"c", b"3").unwrap();
    builder.add(b"d", b"").unwrap();
    builder.add(b"e", b"5").unwrap();
    let meta = builder.finish().unwrap();
    assert_eq!(meta.entry_count, 5);
    assert_eq!(meta.min_key, b"a".to_vec());
    assert_eq!(meta.max_key, b"e".to_vec());
}

// =============================================================================
// Build / Read
// =============================================================================

#[test]
fn test_point_reads() {
    let (_temp, path) = setup();
    build_sample(&path);
    let reader = SSTableReader::open(&path).unwrap();

    assert_eq!(reader.entry_count(), 5);
    assert_eq!(reader.covers_from(), 0);
    assert_eq!(
        reader.get(b"a").unwrap(),
        Some(MemTableEntry::Value(b"1".to_vec()))
    );
    assert_eq!(reader.get(b"b").unwrap(), Some(MemTableEntry::Tombstone));
    assert_eq!(reader.get(b"d").unwrap(), Some(MemTableEntry::Value(Vec::new())));
    assert_eq!(reader.get(b"bb").unwrap(), None);
    assert_eq!(reader.get(b"zzz").unwrap(), None);
}

#[test]
fn test_range_reads_are_inclusive() {
    let (_temp, path) = setup();
    build_sample(&path);
    let reader = SSTableReader::open(&path).unwrap();

    let keys: Vec<Vec<u8>> = reader
        .range(b"b", b"d")
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);

    assert!(reader.overlaps(b"0", b"a"));
    assert!(!reader.overlaps(b"f", b"z"));
    assert!(reader.range(b"f", b"z").unwrap().is_empty());
}

#[test]
fn test_iterator_yields_everything_in_order() {
    let (_temp, path) = setup();
    build_sample(&path);
    let reader = SSTableReader::open(&path).unwrap();

    let items: Vec<(Vec<u8>, MemTableEntry)> =
        reader.iter().unwrap().map(|item| item.unwrap()).collect();
    assert_eq!(items.len(), 5);
    assert_eq!(items[1], (b"b".to_vec(), MemTableEntry::Tombstone));
    assert!(items.windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn test_covering_table_records_its_range() {
    let (_temp, path) = setup();
    let mut builder = SSTableBuilder::covering(&path, 3).unwrap();
    builder.add(b"k", b"v").unwrap();
    builder.finish().unwrap();

    assert_eq!(SSTableReader::open(&path).unwrap().covers_from(), 3);
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_builder_rejects_unsorted_keys() {
    let (_temp, path) = setup();
    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"b", b"1").unwrap();

    assert!(builder.add(b"a", b"2").is_err());
    assert!(builder.add_tombstone(b"b").is_err());
}

#[test]
fn test_corrupted_data_fails_open() {
    let (_temp, path) = setup();
    build_sample(&path);

    let mut bytes = std::fs::read(&path).unwrap();
    // First entry's key byte, just past header + two length fields
    bytes[22 + 8] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        SSTableReader::open(&path),
        Err(HurmaError::Storage(_))
    ));
}

#[test]
fn test_bad_magic_and_short_file_fail_open() {
    let (_temp, path) = setup();
    build_sample(&path);

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0] = b'X';
    std::fs::write(&path, &bytes).unwrap();
    assert!(SSTableReader::open(&path).is_err());

    std::fs::write(&path, b"HRMA").unwrap();
    assert!(SSTableReader::open(&path).is_err());
}
