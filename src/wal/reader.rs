//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{HurmaError, Result};

use super::{WalEntry, HEADER_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Byte offset just past the last entry returned
    position: u64,
    /// File length when opened; bounds the data length a header may claim
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// - `Ok(Some(entry))` — a complete, checksummed entry
    /// - `Ok(None)` — clean end of file
    /// - `Err(WalCorruption)` — torn or corrupted entry at `position()`
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        let filled = read_fully(&mut self.reader, &mut header)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < HEADER_SIZE {
            return Err(HurmaError::WalCorruption(format!(
                "partial header at offset {}",
                self.position
            )));
        }

        let (lsn, crc, len) = WalEntry::parse_header(&header)?;
        if self.position + (HEADER_SIZE as u64) + u64::from(len) > self.file_len {
            return Err(HurmaError::WalCorruption(format!(
                "entry at offset {} claims {} bytes past end of file",
                self.position, len
            )));
        }
        let mut data = vec![0u8; len as usize];
        if read_fully(&mut self.reader, &mut data)? < data.len() {
            return Err(HurmaError::WalCorruption(format!(
                "partial entry at offset {}",
                self.position
            )));
        }

        let entry = WalEntry::decode_body(lsn, crc, len, &data)?;
        self.position += (HEADER_SIZE + data.len()) as u64;
        Ok(Some(entry))
    }

    /// Byte offset of the end of the last valid entry read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries; stops after the first error
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or EOF; returns bytes read
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
