//! Group commit
//!
//! Under `EveryWrite` each mutation must be fsynced before it is
//! acknowledged, but writers to different keys should not queue behind one
//! another's fsync. The WAL mutex is held only for the append. Durability
//! is then awaited outside it: the first waiter becomes the leader and
//! fsyncs everything appended so far, the rest sleep until the synced LSN
//! covers their own entry.
//!
//! A failed fsync cuts the unsynced tail from the file and poisons the log.
//! Every writer whose entry was not yet durable gets an error, and so does
//! every later writer until the engine is reopened.

use std::path::Path;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::WalSyncStrategy;
use crate::error::{HurmaError, Result};

use super::{Operation, WalWriter};

#[derive(Debug, Default)]
struct SyncProgress {
    /// Every entry up to here is on disk
    synced_lsn: u64,
    /// A waiter is currently running fsync
    leader: bool,
    poisoned: bool,
    /// fsyncs performed for waiters
    syncs: u64,
}

/// The engine's handle on the WAL
pub struct CommitLog {
    writer: Mutex<WalWriter>,
    sync_strategy: WalSyncStrategy,
    progress: Mutex<SyncProgress>,
    synced: Condvar,
}

impl CommitLog {
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let writer = WalWriter::open(path)?;
        let progress = SyncProgress {
            synced_lsn: writer.last_lsn(),
            ..SyncProgress::default()
        };
        Ok(Self {
            writer: Mutex::new(writer),
            sync_strategy,
            progress: Mutex::new(progress),
            synced: Condvar::new(),
        })
    }

    /// Log an operation and return once the sync strategy is satisfied
    ///
    /// An error means the entry is not in the log.
    pub fn commit(&self, operation: Operation) -> Result<u64> {
        let lsn = self.append(operation)?;
        if self.sync_strategy == WalSyncStrategy::EveryWrite {
            self.wait_durable(lsn)?;
        }
        Ok(lsn)
    }

    /// Append without waiting for `EveryWrite` durability
    pub(crate) fn append(&self, operation: Operation) -> Result<u64> {
        if self.progress.lock().poisoned {
            return Err(poisoned());
        }

        let mut writer = self.writer.lock();
        let lsn = writer.append(operation)?;

        if let WalSyncStrategy::EveryNEntries { count } = self.sync_strategy {
            if writer.unsynced() >= count.max(1) {
                let through = writer.sync()?;
                drop(writer);
                self.advance(through);
            }
        }
        Ok(lsn)
    }

    /// Block until `lsn` is on disk, leading an fsync if nobody else is
    pub(crate) fn wait_durable(&self, lsn: u64) -> Result<()> {
        let mut progress = self.progress.lock();
        loop {
            if progress.synced_lsn >= lsn {
                return Ok(());
            }
            if progress.poisoned {
                return Err(poisoned());
            }
            if progress.leader {
                self.synced.wait(&mut progress);
                continue;
            }

            progress.leader = true;
            let result = MutexGuard::unlocked(&mut progress, || self.writer.lock().sync());
            progress.leader = false;
            match result {
                Ok(through) => {
                    progress.synced_lsn = progress.synced_lsn.max(through);
                    progress.syncs += 1;
                }
                Err(e) => {
                    tracing::error!("WAL fsync failed, rejecting further writes: {}", e);
                    progress.poisoned = true;
                }
            }
            self.synced.notify_all();
        }
    }

    fn advance(&self, through: u64) {
        let mut progress = self.progress.lock();
        progress.synced_lsn = progress.synced_lsn.max(through);
        self.synced.notify_all();
    }

    /// fsync whatever is pending
    pub fn sync(&self) -> Result<()> {
        let through = self.writer.lock().sync()?;
        self.advance(through);
        Ok(())
    }

    /// Empty the log once its entries are durable elsewhere
    ///
    /// Callers must exclude concurrent commits.
    pub fn truncate(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.truncate()?;
        let through = writer.last_lsn();
        drop(writer);
        self.advance(through);
        Ok(())
    }

    /// Number of fsyncs led by waiting writers
    pub fn sync_count(&self) -> u64 {
        self.progress.lock().syncs
    }
}

fn poisoned() -> HurmaError {
    HurmaError::Storage("WAL sync failed earlier; write not persisted".into())
}
