//! Tests for WalWriter and WalReader
//!
//! These tests verify:
//! - Sequential LSN assignment
//! - LSN continuation after reopening
//! - Truncation keeps LSNs increasing
//! - Appends reach the file before any fsync

use std::path::PathBuf;

use hurmadb::wal::{Operation, WalReader, WalWriter};
use tempfile::TempDir;

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put(i: usize) -> Operation {
    Operation::Put {
        key: format!("key{}", i).into_bytes(),
        value: format!("value{}", i).into_bytes(),
    }
}

fn read_all(path: &PathBuf) -> Vec<u64> {
    WalReader::open(path)
        .unwrap()
        .entries()
        .map(|e| e.unwrap().lsn)
        .collect()
}

#[test]
fn test_lsns_are_sequential() {
    let (_temp, path) = setup_temp_wal();
    let mut writer = WalWriter::open(&path).unwrap();

    assert_eq!(writer.current_lsn(), 1);
    for i in 0..5 {
        assert_eq!(writer.append(put(i)).unwrap(), i as u64 + 1);
    }
    assert_eq!(writer.current_lsn(), 6);

    assert_eq!(read_all(&path), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_reopen_continues_lsns() {
    let (_temp, path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&path).unwrap();
        writer.append(put(0)).unwrap();
        writer.append(put(1)).unwrap();
    }

    let mut writer = WalWriter::open(&path).unwrap();
    assert_eq!(writer.append(put(2)).unwrap(), 3);
    assert_eq!(read_all(&path), vec![1, 2, 3]);
}

#[test]
fn test_truncate_empties_file_and_keeps_counting() {
    let (_temp, path) = setup_temp_wal();
    let mut writer = WalWriter::open(&path).unwrap();
    writer.append(put(0)).unwrap();
    writer.append(put(1)).unwrap();

    writer.truncate().unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    assert_eq!(writer.current_lsn(), 3);

    writer.append(put(2)).unwrap();
    assert_eq!(read_all(&path), vec![3]);
}

#[test]
fn test_appends_reach_the_file_before_sync() {
    let (_temp, path) = setup_temp_wal();
    let mut writer = WalWriter::open(&path).unwrap();
    for i in 0..3 {
        writer.append(put(i)).unwrap();
    }
    assert_eq!(writer.unsynced(), 3);

    // Handed to the OS even though not yet fsynced
    assert_eq!(read_all(&path).len(), 3);

    assert_eq!(writer.sync().unwrap(), 3);
    assert_eq!(writer.unsynced(), 0);
}

#[test]
fn test_reader_position_tracks_valid_prefix() {
    let (_temp, path) = setup_temp_wal();
    let mut writer = WalWriter::open(&path).unwrap();
    writer.append(put(0)).unwrap();
    writer.append(put(1)).unwrap();
    let file_len = std::fs::metadata(&path).unwrap().len();

    let mut reader = WalReader::open(&path).unwrap();
    while reader.next_entry().unwrap().is_some() {}
    assert_eq!(reader.position(), file_len);
}
