//! SSTable writer
//!
//! Streams sorted entries into a new file. The entry count in the header is
//! only known at the end, so `finish` patches it in before the fsync.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{HurmaError, Result};

use super::{SSTable, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Byte offset of the entry count inside the header (after magic + version)
const COUNT_OFFSET: u64 = 6;

/// Buffered output that knows its position and checksums the data block
struct DataWriter {
    inner: BufWriter<File>,
    offset: u64,
    crc: crc32fast::Hasher,
}

impl DataWriter {
    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.crc.update(bytes);
        self.offset += bytes.len() as u64;
        Ok(())
    }
}

/// Writes one SSTable; keys must arrive strictly ascending
pub struct SSTableBuilder {
    path: PathBuf,
    out: DataWriter,
    /// key → offset of its entry, in key order
    index: Vec<(Vec<u8>, u64)>,
}

impl SSTableBuilder {
    /// Builder for a table produced by a memtable flush
    pub fn new(path: &Path) -> Result<Self> {
        Self::covering(path, 0)
    }

    /// Builder for a compaction output that supersedes ids `[covers_from, own id)`
    pub fn covering(path: &Path, covers_from: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut inner = BufWriter::new(file);

        inner.write_all(MAGIC)?;
        inner.write_all(&VERSION.to_le_bytes())?;
        inner.write_all(&0u64.to_le_bytes())?;
        inner.write_all(&covers_from.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            out: DataWriter {
                inner,
                offset: HEADER_SIZE,
                crc: crc32fast::Hasher::new(),
            },
            index: Vec::new(),
        })
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append(key, Some(value))
    }

    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.append(key, None)
    }

    fn append(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if let Some((last, _)) = self.index.last() {
            if key <= last.as_slice() {
                return Err(HurmaError::Storage(format!(
                    "SSTable keys out of order: {:?} after {:?}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(last)
                )));
            }
        }

        self.index.push((key.to_vec(), self.out.offset));

        let value_len = value.map_or(TOMBSTONE_MARKER, |v| v.len() as u32);
        self.out.put(&(key.len() as u32).to_le_bytes())?;
        self.out.put(&value_len.to_le_bytes())?;
        self.out.put(key)?;
        if let Some(v) = value {
            self.out.put(v)?;
        }
        Ok(())
    }

    /// Entries added so far
    pub fn entry_count(&self) -> u64 {
        self.index.len() as u64
    }

    /// Write the index block and footer, fix up the header, and fsync
    pub fn finish(self) -> Result<SSTable> {
        let SSTableBuilder { path, out, index } = self;
        let DataWriter {
            mut inner,
            offset: index_offset,
            crc,
        } = out;
        let entry_count = index.len() as u64;

        for (key, offset) in &index {
            inner.write_all(&(key.len() as u32).to_le_bytes())?;
            inner.write_all(&offset.to_le_bytes())?;
            inner.write_all(key)?;
        }

        inner.write_all(&index_offset.to_le_bytes())?;
        inner.write_all(&crc.finalize().to_le_bytes())?;
        inner.write_all(&[0u8; 4])?;

        let mut file = inner
            .into_inner()
            .map_err(|e| HurmaError::Storage(format!("Failed to flush SSTable: {}", e)))?;
        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&entry_count.to_le_bytes())?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();

        let min_key = index.first().map(|(k, _)| k.clone()).unwrap_or_default();
        let max_key = index.last().map(|(k, _)| k.clone()).unwrap_or_default();

        Ok(SSTable {
            path,
            entry_count,
            min_key,
            max_key,
            file_size,
        })
    }
}
