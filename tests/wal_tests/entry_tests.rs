//! Tests for WAL entry framing
//!
//! These tests verify:
//! - Header layout (LSN | CRC | Len)
//! - CRC32 corruption detection in data and header
//! - Truncated input handling

use hurmadb::wal::{Operation, WalEntry, HEADER_SIZE};
use hurmadb::HurmaError;

fn put(key: &str, value: &str) -> Operation {
    Operation::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

// =============================================================================
// Framing
// =============================================================================

#[test]
fn test_header_layout() {
    let entry = WalEntry::new(7, put("k", "v"));
    let bytes = entry.serialize().unwrap();

    let lsn = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let crc = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let len = u32::from_le_bytes(bytes[12..16].try_into().unwrap());

    assert_eq!(lsn, 7);
    assert_eq!(len as usize, bytes.len() - HEADER_SIZE);
    assert_eq!(crc, WalEntry::compute_crc(lsn, len, &bytes[HEADER_SIZE..]));
}

#[test]
fn test_decodes_put_and_delete() {
    let put_entry = WalEntry::new(1, put("hello", "world"));
    let decoded = WalEntry::deserialize(&put_entry.serialize().unwrap()).unwrap();
    assert_eq!(decoded, put_entry);

    let del_entry = WalEntry::new(2, Operation::Delete { key: b"hello".to_vec() });
    let decoded = WalEntry::deserialize(&del_entry.serialize().unwrap()).unwrap();
    assert_eq!(decoded, del_entry);
}

#[test]
fn test_decodes_only_the_first_entry_of_a_buffer() {
    let mut bytes = WalEntry::new(1, put("a", "1")).serialize().unwrap();
    bytes.extend(WalEntry::new(2, put("b", "2")).serialize().unwrap());

    assert_eq!(WalEntry::deserialize(&bytes).unwrap().lsn, 1);
}

// =============================================================================
// Corruption Detection
// =============================================================================

#[test]
fn test_flipped_data_byte_is_detected() {
    let mut bytes = WalEntry::new(1, put("key", "value")).serialize().unwrap();
    if let Some(byte) = bytes.last_mut() {
        *byte ^= 0xFF;
    }

    let result = WalEntry::deserialize(&bytes);
    assert!(matches!(result, Err(HurmaError::WalCorruption(_))));
}

#[test]
fn test_flipped_lsn_is_detected() {
    // The checksum covers the LSN, so a bit flip there cannot go unnoticed
    let mut bytes = WalEntry::new(1, put("key", "value")).serialize().unwrap();
    bytes[0] ^= 0x02;

    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(HurmaError::WalCorruption(_))
    ));
}

#[test]
fn test_truncated_input_is_corruption() {
    let bytes = WalEntry::new(1, put("key", "value")).serialize().unwrap();

    for cut in [0, 5, HEADER_SIZE, bytes.len() - 1] {
        assert!(
            matches!(
                WalEntry::deserialize(&bytes[..cut]),
                Err(HurmaError::WalCorruption(_))
            ),
            "cut at {}",
            cut
        );
    }
}
