//! SSTable Iterator
//!
//! Sequential iteration over all entries in an SSTable.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;
use crate::memtable::MemTableEntry;

use super::reader::le_u32;
use super::{HEADER_SIZE, TOMBSTONE_MARKER};

/// Iterator over SSTable entries in sorted key order
///
/// Owns a separate file handle, so a long scan (compaction) does not block
/// point lookups on the same table.
pub struct SSTableIterator {
    file: BufReader<File>,
    /// Stop reading when we reach this offset (start of index block)
    end_offset: u64,
    /// Current position in file
    current_offset: u64,
}

impl SSTableIterator {
    /// Open `path` and position at the start of the data block
    pub(super) fn open(path: &Path, end_offset: u64) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: HEADER_SIZE,
        })
    }

    fn read_next(&mut self) -> Result<(Vec<u8>, MemTableEntry)> {
        let mut header = [0u8; 8];
        self.file.read_exact(&mut header)?;

        let key_len = le_u32(&header[0..4]) as usize;
        let val_len = le_u32(&header[4..8]);

        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;

        let mut entry_size = 8 + key_len as u64;

        let entry = if val_len == TOMBSTONE_MARKER {
            MemTableEntry::Tombstone
        } else {
            let mut v = vec![0u8; val_len as usize];
            self.file.read_exact(&mut v)?;
            entry_size += val_len as u64;
            MemTableEntry::Value(v)
        };

        self.current_offset += entry_size;
        Ok((key, entry))
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<(Vec<u8>, MemTableEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        // Stop at index block
        if self.current_offset >= self.end_offset {
            return None;
        }

        match self.read_next() {
            Ok(item) => Some(Ok(item)),
            Err(e) => {
                // Don't keep reading garbage after a failure
                self.current_offset = self.end_offset;
                Some(Err(e))
            }
        }
    }
}
