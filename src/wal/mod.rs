//! Write-ahead log
//!
//! Every mutation is appended here before it reaches the memtable, so an
//! acknowledged write survives a crash. The log is emptied after each
//! successful memtable flush.
//!
//! Entries are laid end to end, little-endian:
//!
//! ```text
//! LSN u64 | CRC32 u32 | Len u32 | Data (Len bytes, bincode)
//! ```
//!
//! The CRC covers LSN, Len and Data. Recovery stops at the first entry that
//! is short or fails its checksum and cuts the file there.
//!
//! Writers go through [`CommitLog`], which batches concurrent fsyncs.

mod commit;
mod entry;
mod writer;
mod reader;
mod recovery;

pub use commit::CommitLog;
pub use entry::{WalEntry, Operation, HEADER_SIZE};
pub use writer::{LogFile, WalWriter};
pub use reader::{WalReader, WalIterator};
pub use recovery::{WalRecovery, RecoveryResult};
