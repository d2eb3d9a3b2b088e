//! Size-tiered compaction
//!
//! SSTables are kept newest → oldest. A compaction merges a contiguous run
//! of them into one table; only contiguous runs are eligible, so newest-wins
//! resolution never skips over a table holding an intermediate version.
//!
//! Selection rules, first match wins:
//! 1. More than `max_tables` tables: merge everything (space amplification bound).
//! 2. A run of at least `min_threshold` tables whose sizes each fall within
//!    `[bucket_low, bucket_high] ×` the run's running average (capped at
//!    `max_threshold` tables).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;

use crate::config::CompactionPolicy;
use crate::error::Result;
use crate::memtable::MemTableEntry;

use super::sstable::SSTableIterator;

/// Outcome of one compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionStats {
    /// Number of SSTables merged
    pub input_tables: usize,
    /// Entries written to the merged table
    pub output_entries: u64,
    /// Tombstones discarded because no older table remained below them
    pub dropped_tombstones: u64,
    /// Superseded versions discarded
    pub dropped_versions: u64,
}

/// Pick the run of tables (indices into the newest → oldest list) to merge
pub fn select_compaction(sizes: &[u64], policy: &CompactionPolicy) -> Option<Range<usize>> {
    if sizes.len() > policy.max_tables {
        return Some(0..sizes.len());
    }

    let min_run = policy.min_threshold.max(2);
    for start in 0..sizes.len() {
        let mut total = sizes[start] as f64;
        let mut count = 1usize;

        for &size in &sizes[start + 1..] {
            if count >= policy.max_threshold {
                break;
            }
            let avg = total / count as f64;
            let size = size as f64;
            if size < policy.bucket_low * avg || size > policy.bucket_high * avg {
                break;
            }
            total += size;
            count += 1;
        }

        if count >= min_run {
            return Some(start..start + count);
        }
    }

    None
}

// =============================================================================
// Merge
// =============================================================================

struct HeapEntry {
    key: Vec<u8>,
    entry: MemTableEntry,
    /// Position in the newest → oldest input list (0 = newest)
    source: usize,
    iterator: SSTableIterator,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Max-heap: smallest key first, then newest source
    fn cmp(&self, other: &Self) -> Ordering {
        match self.key.cmp(&other.key) {
            Ordering::Equal => other.source.cmp(&self.source),
            ord => ord.reverse(),
        }
    }
}

/// Merges sorted SSTable iterators, yielding each key once with its newest entry
pub struct MergeIterator {
    heap: BinaryHeap<HeapEntry>,
    last_key: Option<Vec<u8>>,
    /// Versions skipped because a newer source already produced the key
    pub shadowed: u64,
}

impl MergeIterator {
    /// `iterators` must be ordered newest → oldest
    pub fn new(iterators: Vec<SSTableIterator>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(iterators.len());
        for (source, iterator) in iterators.into_iter().enumerate() {
            Self::push_next(&mut heap, source, iterator)?;
        }
        Ok(Self {
            heap,
            last_key: None,
            shadowed: 0,
        })
    }

    fn push_next(
        heap: &mut BinaryHeap<HeapEntry>,
        source: usize,
        mut iterator: SSTableIterator,
    ) -> Result<()> {
        if let Some(item) = iterator.next() {
            let (key, entry) = item?;
            heap.push(HeapEntry {
                key,
                entry,
                source,
                iterator,
            });
        }
        Ok(())
    }
}

impl Iterator for MergeIterator {
    type Item = Result<(Vec<u8>, MemTableEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(head) = self.heap.pop() {
            let HeapEntry {
                key,
                entry,
                source,
                iterator,
            } = head;

            if let Err(e) = Self::push_next(&mut self.heap, source, iterator) {
                return Some(Err(e));
            }

            if self.last_key.as_deref() == Some(key.as_slice()) {
                self.shadowed += 1;
                continue;
            }

            self.last_key = Some(key.clone());
            return Some(Ok((key, entry)));
        }

        None
    }
}
