//! In-memory write buffer
//!
//! A sorted map of the most recent writes, tombstones included, with an
//! approximate byte size the engine compares against its flush limit.
//! Same-key ordering is the engine's job (striped locks); the table itself
//! only guarantees that each call is atomic.

mod table;

pub use table::MemTable;

/// Entry stored in the MemTable (and read back from SSTables)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// The live value, or `None` for a tombstone
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            MemTableEntry::Value(v) => Some(v),
            MemTableEntry::Tombstone => None,
        }
    }
}
