//! SSTables
//!
//! Immutable sorted files produced by memtable flushes and compactions.
//! All integers are little-endian.
//!
//! ```text
//! header   magic "HRMA" | version u16 | entry count u64 | covers_from u64
//! data     key_len u32 | value_len u32 | key | value        (per entry)
//!          value_len == u32::MAX marks a tombstone, no value bytes follow
//! index    key_len u32 | entry offset u64 | key             (per entry)
//! footer   index offset u64 | CRC32 of the data block u32 | 4 zero bytes
//! ```
//!
//! `covers_from` is the smallest table id merged into this one, 0 for a
//! flush. Once a table with id N exists, tables with ids in
//! `[covers_from, N)` are obsolete and are removed on open.

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

pub(crate) const MAGIC: &[u8; 4] = b"HRMA";
pub(crate) const VERSION: u16 = 2;

pub(crate) const HEADER_SIZE: u64 = 4 + 2 + 8 + 8;
pub(crate) const FOOTER_SIZE: u64 = 8 + 4 + 4;

/// `value_len` of a tombstone entry
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// What [`SSTableBuilder::finish`] wrote
#[derive(Debug, Clone)]
pub struct SSTable {
    pub path: PathBuf,
    pub entry_count: u64,
    /// Empty when the table has no entries
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub file_size: u64,
}
