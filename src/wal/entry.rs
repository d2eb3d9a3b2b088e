//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their on-disk
//! framing: `LSN (8) | CRC (4) | Len (4) | Data`, little-endian, where the
//! CRC covers LSN, Len and Data.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{HurmaError, Result};

/// Fixed header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

/// The bincode-encoded body of an entry
#[derive(Serialize, Deserialize)]
struct Payload {
    operation: Operation,
    timestamp: u64,
}

impl WalEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Encode header + payload
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = Payload {
            operation: self.operation.clone(),
            timestamp: self.timestamp,
        };
        let data = bincode::serialize(&payload)
            .map_err(|e| HurmaError::Serialization(e.to_string()))?;

        let len = u32::try_from(data.len()).map_err(|_| {
            HurmaError::Serialization(format!("WAL entry too large: {} bytes", data.len()))
        })?;
        let crc = Self::compute_crc(self.lsn, len, &data);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + data.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&data);
        Ok(bytes)
    }

    /// Decode one entry from the front of `bytes`
    ///
    /// Fails with `WalCorruption` on a short buffer or checksum mismatch.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (lsn, crc, len) = Self::parse_header(bytes)?;

        let end = HEADER_SIZE + len as usize;
        if bytes.len() < end {
            return Err(HurmaError::WalCorruption(format!(
                "truncated entry: expected {} data bytes, got {}",
                len,
                bytes.len() - HEADER_SIZE
            )));
        }

        Self::decode_body(lsn, crc, len, &bytes[HEADER_SIZE..end])
    }

    /// Split a header into (lsn, crc, len)
    pub(crate) fn parse_header(bytes: &[u8]) -> Result<(u64, u32, u32)> {
        if bytes.len() < HEADER_SIZE {
            return Err(HurmaError::WalCorruption(format!(
                "truncated header: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);

        Ok((
            u64::from_le_bytes(lsn),
            u32::from_le_bytes(crc),
            u32::from_le_bytes(len),
        ))
    }

    /// Verify the checksum and decode the payload
    pub(crate) fn decode_body(lsn: u64, crc: u32, len: u32, data: &[u8]) -> Result<Self> {
        let actual = Self::compute_crc(lsn, len, data);
        if actual != crc {
            return Err(HurmaError::WalCorruption(format!(
                "checksum mismatch at lsn {}: stored {:08x}, computed {:08x}",
                lsn, crc, actual
            )));
        }

        let payload: Payload = bincode::deserialize(data)
            .map_err(|e| HurmaError::WalCorruption(format!("undecodable entry: {}", e)))?;

        Ok(Self {
            lsn,
            operation: payload.operation,
            timestamp: payload.timestamp,
        })
    }

    /// CRC32 over LSN, length and data
    pub fn compute_crc(lsn: u64, len: u32, data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(&len.to_le_bytes());
        hasher.update(data);
        hasher.finalize()
    }
}
