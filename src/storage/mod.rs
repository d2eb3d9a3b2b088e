//! Storage Module
//!
//! Persistent storage layer using an SSTable format.
//!
//! ## Responsibilities
//! - Persist data to disk in sorted format
//! - Efficient range scans and point lookups
//! - Size-tiered compaction to bound space and scan cost
//!
//! See [`sstable`] for the file format and [`compaction`] for the merge policy.

pub mod compaction;
mod manager;
mod sstable;

pub use compaction::{select_compaction, CompactionStats};
pub use manager::StorageManager;
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
