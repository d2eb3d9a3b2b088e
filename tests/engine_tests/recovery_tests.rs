//! Crash recovery through the Engine
//!
//! These tests verify:
//! - Acknowledged writes survive a crash (drop without close)
//! - A torn WAL tail is discarded, the prefix is kept
//! - Recovered records are flushed and the WAL emptied on open
//! - Flushed and compacted state survives restarts

use std::fs::{self, OpenOptions};
use std::io::Write;

use hurmadb::config::Config;
use hurmadb::engine::Engine;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Engine {
    Engine::open(Config::builder().data_dir(dir.path()).build()).unwrap()
}

fn wal_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("wal.log")
}

#[test]
fn test_recover_after_crash() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open(&temp);
        engine.set(b"a", b"1").unwrap();
        engine.set(b"b", b"2").unwrap();
        engine.set(b"a", b"3").unwrap();
        assert!(engine.del(b"b").unwrap());
        engine.set(b"c", b"4").unwrap();
        // Dropped without close: only the WAL holds these
        assert_eq!(engine.sstable_count(), 0);
    }

    let engine = open(&temp);
    assert_eq!(engine.get(b"a").unwrap(), Some(b"3".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), None);
    assert_eq!(engine.get(b"c").unwrap(), Some(b"4".to_vec()));

    // Recovered records were moved into an SSTable and the WAL emptied
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(fs::metadata(wal_path(&temp)).unwrap().len(), 0);
}

#[test]
fn test_torn_wal_tail_is_discarded() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open(&temp);
        engine.set(b"kept", b"yes").unwrap();
        engine.set(b"lost", b"maybe").unwrap();
    }

    // Chop the last entry in half, as a crash mid-append would
    let path = wal_path(&temp);
    let len = fs::metadata(&path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len - 4)
        .unwrap();

    let engine = open(&temp);
    assert_eq!(engine.get(b"kept").unwrap(), Some(b"yes".to_vec()));
    assert_eq!(engine.get(b"lost").unwrap(), None);

    // The engine is fully usable afterwards
    engine.set(b"lost", b"again").unwrap();
    drop(engine);
    let engine = open(&temp);
    assert_eq!(engine.get(b"lost").unwrap(), Some(b"again".to_vec()));
}

#[test]
fn test_garbage_appended_to_wal_is_ignored() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open(&temp);
        engine.set(b"k", b"v").unwrap();
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(wal_path(&temp))
        .unwrap();
    file.write_all(&[0xAB; 40]).unwrap();
    drop(file);

    let engine = open(&temp);
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_closed_engine_reopens_from_sstables() {
    let temp = TempDir::new().unwrap();
    {
        let engine = open(&temp);
        for i in 0..20 {
            let key = format!("key_{:02}", i);
            engine.set(key.as_bytes(), b"v").unwrap();
        }
        engine.del(b"key_05").unwrap();
        engine.close().unwrap();
    }
    assert_eq!(fs::metadata(wal_path(&temp)).unwrap().len(), 0);

    let engine = open(&temp);
    let records = engine.get_range(b"key_00", b"key_99").unwrap();
    assert_eq!(records.len(), 19);
    assert_eq!(engine.get(b"key_05").unwrap(), None);
}

#[test]
fn test_compacted_state_survives_restart() {
    let temp = TempDir::new().unwrap();
    let expected = {
        let engine = open(&temp);
        // Three tables stay below the tiered threshold
        for round in 0..3 {
            for i in 0..10 {
                let key = format!("key_{}", i);
                engine
                    .set(key.as_bytes(), format!("r{}", round).as_bytes())
                    .unwrap();
            }
            engine.del(format!("key_{}", round).as_bytes()).unwrap();
            engine.flush().unwrap();
        }
        assert_eq!(engine.sstable_count(), 3);

        let before = engine.get_range(b"key_0", b"key_9").unwrap();
        assert!(engine.compact().unwrap().is_some());
        assert_eq!(engine.sstable_count(), 1);
        assert_eq!(engine.get_range(b"key_0", b"key_9").unwrap(), before);
        before
    };

    let engine = open(&temp);
    assert_eq!(engine.get_range(b"key_0", b"key_9").unwrap(), expected);
    assert_eq!(engine.get(b"key_2").unwrap(), None);
    assert_eq!(engine.get(b"key_0").unwrap(), Some(b"r2".to_vec()));
    assert_eq!(expected.len(), 9);
}
