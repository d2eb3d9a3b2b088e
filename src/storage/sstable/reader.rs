//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{HurmaError, Result};
use crate::memtable::MemTableEntry;

use super::iterator::SSTableIterator;
use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Reader for SSTable files with in-memory index for O(log n) lookups
///
/// The file handle sits behind its own mutex so lookups take `&self` and
/// readers of different tables never contend.
pub struct SSTableReader {
    path: PathBuf,
    /// File handle for reading entries
    file: Mutex<BufReader<File>>,
    /// In-memory index: key → file offset
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
    covers_from: u64,
    file_size: u64,
    /// Index block starting offset (end of data block)
    index_offset: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header, footer and data checksum, then loads the entire
    /// index into memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(HurmaError::Storage(format!(
                "SSTable {} too small: {} bytes",
                path.display(),
                file_size
            )));
        }

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(HurmaError::Storage(format!(
                "Invalid SSTable magic in {}: got {:?}",
                path.display(),
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(HurmaError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let entry_count = le_u64(&header[6..14]);
        let covers_from = le_u64(&header[14..22]);

        // Read footer to get index offset
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = le_u64(&footer[0..8]);
        let data_crc = le_u32(&footer[8..12]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(HurmaError::Storage(format!(
                "SSTable {} has index offset {} outside the file",
                path.display(),
                index_offset
            )));
        }

        Self::verify_data_crc(&mut file, index_offset, data_crc, path)?;

        // Index block size = file_size - footer_size - index_offset
        let index_block_size = file_size - FOOTER_SIZE - index_offset;
        let mut index_data = vec![0u8; index_block_size as usize];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut index_data)?;

        // Parse index entries: [key_len(4)][offset(8)][key]
        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos < index_data.len() {
            if pos + 12 > index_data.len() {
                return Err(Self::corrupt_index(path));
            }
            let key_len = le_u32(&index_data[pos..pos + 4]) as usize;
            let offset = le_u64(&index_data[pos + 4..pos + 12]);
            pos += 12;

            if pos + key_len > index_data.len() {
                return Err(Self::corrupt_index(path));
            }
            index.insert(index_data[pos..pos + key_len].to_vec(), offset);
            pos += key_len;
        }

        if index.len() as u64 != entry_count {
            return Err(HurmaError::Storage(format!(
                "SSTable {} header says {} entries, index has {}",
                path.display(),
                entry_count,
                index.len()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            covers_from,
            file_size,
            index_offset,
        })
    }

    fn verify_data_crc(file: &mut File, index_offset: u64, expected: u32, path: &Path) -> Result<()> {
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = index_offset - HEADER_SIZE;
        let mut chunk = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            file.read_exact(&mut chunk[..n])?;
            hasher.update(&chunk[..n]);
            remaining -= n as u64;
        }

        let actual = hasher.finalize();
        if actual != expected {
            return Err(HurmaError::Storage(format!(
                "SSTable {} data checksum mismatch: stored {:08x}, computed {:08x}",
                path.display(),
                expected,
                actual
            )));
        }
        Ok(())
    }

    fn corrupt_index(path: &Path) -> HurmaError {
        HurmaError::Storage(format!("SSTable {} has a truncated index block", path.display()))
    }

    /// Get the entry for a key — O(log n) lookup via in-memory index
    ///
    /// Returns:
    /// - `Ok(Some(Value(v)))` — key found with value
    /// - `Ok(Some(Tombstone))` — key deleted as of this table
    /// - `Ok(None)` — key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<MemTableEntry>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };

        let mut file = self.file.lock();
        Self::read_entry_at(&mut file, offset).map(|(_, entry)| Some(entry))
    }

    /// Entries with `from <= key <= to`, in key order, tombstones included
    pub fn range(&self, from: &[u8], to: &[u8]) -> Result<Vec<(Vec<u8>, MemTableEntry)>> {
        if from > to {
            return Ok(Vec::new());
        }

        let offsets: Vec<u64> = self
            .index
            .range::<[u8], _>((Bound::Included(from), Bound::Included(to)))
            .map(|(_, &offset)| offset)
            .collect();
        if offsets.is_empty() {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        offsets
            .into_iter()
            .map(|offset| Self::read_entry_at(&mut file, offset))
            .collect()
    }

    /// Read one `[key_len][val_len][key][value]` record at `offset`
    fn read_entry_at(file: &mut BufReader<File>, offset: u64) -> Result<(Vec<u8>, MemTableEntry)> {
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let key_len = le_u32(&header[0..4]) as usize;
        let val_len = le_u32(&header[4..8]);

        let mut key = vec![0u8; key_len];
        file.read_exact(&mut key)?;

        if val_len == TOMBSTONE_MARKER {
            return Ok((key, MemTableEntry::Tombstone));
        }

        let mut value = vec![0u8; val_len as usize];
        file.read_exact(&mut value)?;
        Ok((key, MemTableEntry::Value(value)))
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Smallest SSTable id merged into this one (0 for a plain flush)
    pub fn covers_from(&self) -> u64 {
        self.covers_from
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false, // Empty SSTable
        }
    }

    /// True if [from, to] intersects [min_key, max_key]
    pub fn overlaps(&self, from: &[u8], to: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => from <= max && to >= min,
            _ => false,
        }
    }

    /// Create an iterator over all entries (for compaction, debugging)
    pub fn iter(&self) -> Result<SSTableIterator> {
        SSTableIterator::open(&self.path, self.index_offset)
    }
}

pub(super) fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
