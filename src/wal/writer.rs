//! WAL Writer
//!
//! Appends entries to the WAL file. Sync policy lives one level up in
//! [`CommitLog`](super::CommitLog); the writer only knows how to append,
//! fsync and undo.
//!
//! A failed append or fsync must leave no trace in the file, otherwise the
//! entry would be replayed after a restart although its writer saw an error.
//! The writer therefore remembers where each append started and where the
//! last fsync ended, and cuts the file back on failure. If even that fails
//! the writer is poisoned and refuses every later append.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{HurmaError, Result};

use super::{Operation, WalEntry, WalRecovery};

/// File operations the WAL needs beyond `Write + Seek`
pub trait LogFile: Write + Seek + Send {
    fn sync_data(&self) -> io::Result<()>;
    fn set_len(&self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// Writes entries to the WAL file
pub struct WalWriter<F: LogFile = File> {
    /// `None` once poisoned
    writer: Option<BufWriter<F>>,
    /// End of the last fully written entry
    offset: u64,
    /// End of the last fsynced entry
    synced_offset: u64,
    /// LSN the next appended entry receives
    next_lsn: u64,
    /// Entries appended since the last fsync
    unsynced: usize,
}

impl WalWriter<File> {
    /// Open or create a WAL file
    ///
    /// An existing file is scanned so LSNs continue after its last valid
    /// entry; recovery is expected to have already truncated any torn tail.
    pub fn open(path: &Path) -> Result<Self> {
        let last_lsn = if path.exists() {
            WalRecovery::verify(path)?.last_lsn
        } else {
            0
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let len = file.seek(SeekFrom::End(0))?;

        Ok(Self::from_file(file, len, last_lsn + 1))
    }
}

impl<F: LogFile> WalWriter<F> {
    /// Wrap a file positioned at `len`, its end
    pub fn from_file(file: F, len: u64, next_lsn: u64) -> Self {
        Self {
            writer: Some(BufWriter::new(file)),
            offset: len,
            synced_offset: len,
            next_lsn,
            unsynced: 0,
        }
    }

    /// Append an operation, returning the LSN it was logged under
    ///
    /// The entry is handed to the OS before returning but not fsynced. On
    /// error the file is cut back to where the entry began and the LSN is
    /// not consumed.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.next_lsn;
        let bytes = WalEntry::new(lsn, operation).serialize()?;
        let writer = self.writer_mut()?;

        let written = writer.write_all(&bytes).and_then(|()| writer.flush());
        if let Err(e) = written {
            self.rollback(self.offset);
            return Err(HurmaError::Storage(format!("WAL append failed: {}", e)));
        }

        self.offset += bytes.len() as u64;
        self.next_lsn += 1;
        self.unsynced += 1;
        Ok(lsn)
    }

    /// Force everything appended so far to disk
    ///
    /// Returns the highest LSN now durable. On error every entry since the
    /// previous successful sync is cut from the file.
    pub fn sync(&mut self) -> Result<u64> {
        let writer = self.writer_mut()?;
        let synced = writer.flush().and_then(|()| writer.get_ref().sync_data());
        if let Err(e) = synced {
            self.rollback(self.synced_offset);
            return Err(HurmaError::Storage(format!("WAL sync failed: {}", e)));
        }

        self.synced_offset = self.offset;
        self.unsynced = 0;
        Ok(self.last_lsn())
    }

    /// Discard every entry (after their contents became durable elsewhere)
    ///
    /// LSNs keep counting up so callers tracking durability by LSN stay valid.
    pub fn truncate(&mut self) -> Result<()> {
        let writer = self.writer_mut()?;
        writer.flush()?;
        let file = writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_data()?;
        self.offset = 0;
        self.synced_offset = 0;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop buffered bytes and cut the file back to `offset`
    fn rollback(&mut self, offset: u64) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        let (mut file, _discarded) = writer.into_parts();

        let restored = file
            .set_len(offset)
            .and_then(|()| file.seek(SeekFrom::Start(offset)).map(|_| ()));
        match restored {
            Ok(()) => {
                tracing::warn!("WAL rolled back to {} bytes", offset);
                self.offset = offset;
                self.synced_offset = self.synced_offset.min(offset);
                self.unsynced = 0;
                self.writer = Some(BufWriter::new(file));
            }
            Err(e) => {
                tracing::error!("WAL rollback to {} bytes failed, log poisoned: {}", offset, e);
            }
        }
    }

    fn writer_mut(&mut self) -> Result<&mut BufWriter<F>> {
        self.writer
            .as_mut()
            .ok_or_else(|| HurmaError::Storage("WAL is poisoned by an earlier failure".into()))
    }

    /// LSN the next appended entry will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// LSN of the last appended entry (0 if none yet)
    pub fn last_lsn(&self) -> u64 {
        self.next_lsn - 1
    }

    /// Entries appended since the last successful sync
    pub fn unsynced(&self) -> usize {
        self.unsynced
    }

    pub fn is_poisoned(&self) -> bool {
        self.writer.is_none()
    }
}
