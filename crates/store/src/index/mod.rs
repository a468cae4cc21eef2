//! Block index: maps logical positions to the blocks that hold them.
//!
//! The index is a pair of parallel arrays sorted by firstPre. Entry `i`
//! owns the positions `first_pres[i]..first_pres[i + 1]` (the last entry is
//! bounded by the record count), stored in physical block `blocks[i]`.
//!
//! ```text
//!   slot        0     1     2
//!   first_pre   0     4     6        count = 9
//!   block       0     3     1
//!   owns      0..4  4..6  6..9
//! ```

mod codec;

pub use codec::IndexFile;

use crate::error::{BlockId, Error, Pre, Result};

/// Result of a [`BlockIndex::locate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    /// Index slot owning the position.
    pub slot: usize,
    /// First position stored in the block.
    pub first_pre: Pre,
    /// First position of the following block (or the record count).
    pub next_pre: Pre,
}

impl Located {
    /// Number of records stored in the located block.
    pub fn len(&self) -> usize {
        (self.next_pre - self.first_pre) as usize
    }

    /// Checks if the located block holds no records.
    pub fn is_empty(&self) -> bool {
        self.next_pre == self.first_pre
    }
}

/// Sorted firstPre → block number mapping.
#[derive(Debug, Clone, Default)]
pub struct BlockIndex {
    /// First position of each live block, strictly increasing.
    first_pres: Vec<Pre>,
    /// Physical block number of each live block.
    blocks: Vec<BlockId>,
    /// Slot returned by the last successful search; seeds the next one.
    last: usize,
}

impl BlockIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from parallel arrays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] if the arrays differ in length.
    pub fn from_parts(first_pres: Vec<Pre>, blocks: Vec<BlockId>) -> Result<Self> {
        if first_pres.len() != blocks.len() {
            return Err(Error::Corrupted {
                reason: format!(
                    "{} firstPre values but {} block numbers",
                    first_pres.len(),
                    blocks.len()
                ),
            });
        }
        Ok(Self { first_pres, blocks, last: 0 })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.first_pres.len()
    }

    /// Checks if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.first_pres.is_empty()
    }

    /// First positions of all live blocks.
    pub fn first_pres(&self) -> &[Pre] {
        &self.first_pres
    }

    /// Block numbers of all live blocks.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Block number stored at `slot`.
    pub fn block(&self, slot: usize) -> BlockId {
        self.blocks[slot]
    }

    /// Upper bound of the span owned by `slot`.
    pub fn next_pre(&self, slot: usize, count: Pre) -> Pre {
        self.first_pres.get(slot + 1).copied().unwrap_or(count)
    }

    /// Finds the slot with `first_pres[slot] <= pre < next_pre(slot)`.
    ///
    /// The previous result is probed first, so sequential access usually
    /// resolves without a search.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAccess`] if no slot owns `pre`, which means
    /// `pre >= count` or the index is inconsistent.
    pub fn locate(&mut self, pre: Pre, count: Pre) -> Result<Located> {
        let index_size = self.first_pres.len();
        let invalid = || Error::InvalidAccess { pre, index_size };
        if index_size == 0 {
            return Err(invalid());
        }

        let mut low = 0;
        let mut high = index_size - 1;
        let mut mid = self.last.min(high);
        loop {
            let first_pre = self.first_pres[mid];
            let next_pre = self.next_pre(mid, count);
            if pre < first_pre {
                if mid == 0 {
                    return Err(invalid());
                }
                high = mid - 1;
            } else if pre >= next_pre {
                low = mid + 1;
            } else {
                self.last = mid;
                return Ok(Located { slot: mid, first_pre, next_pre });
            }
            if low > high {
                return Err(invalid());
            }
            mid = low + (high - low) / 2;
        }
    }

    /// Inserts one entry at `slot`, shifting later entries right.
    pub fn insert_entry(&mut self, slot: usize, first_pre: Pre, block: BlockId) {
        self.first_pres.insert(slot, first_pre);
        self.blocks.insert(slot, block);
    }

    /// Inserts consecutive entries starting at `slot`, in the given order.
    pub fn insert_entries(&mut self, slot: usize, entries: &[(Pre, BlockId)]) {
        self.first_pres.splice(slot..slot, entries.iter().map(|&(pre, _)| pre));
        self.blocks.splice(slot..slot, entries.iter().map(|&(_, block)| block));
    }

    /// Removes `n` consecutive entries starting at `from`.
    pub fn remove_range(&mut self, from: usize, n: usize) {
        self.first_pres.drain(from..from + n);
        self.blocks.drain(from..from + n);
        if self.last >= self.first_pres.len() {
            self.last = self.first_pres.len().saturating_sub(1);
        }
    }

    /// Adds `delta` to every firstPre at or after `from`.
    pub fn shift_first_pres(&mut self, from: usize, delta: i64) {
        for pre in self.first_pres.iter_mut().skip(from) {
            *pre = pre.saturating_add_signed(delta);
        }
    }

    /// Overwrites the firstPre of `slot`.
    pub fn set_first_pre(&mut self, slot: usize, pre: Pre) {
        self.first_pres[slot] = pre;
    }

    /// Verifies the ordering and coverage invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] naming the first violated invariant.
    pub fn check(&self, count: Pre, nr_blocks: BlockId, entries: usize) -> Result<()> {
        let corrupted = |reason: String| Err(Error::Corrupted { reason });

        if self.first_pres.len() as u64 > nr_blocks {
            return corrupted(format!(
                "index size {} exceeds block count {nr_blocks}",
                self.first_pres.len()
            ));
        }
        let Some(&first) = self.first_pres.first() else {
            if count != 0 {
                return corrupted(format!("empty index for {count} records"));
            }
            return Ok(());
        };
        if first != 0 {
            return corrupted(format!("first block starts at {first}"));
        }
        for slot in 0..self.first_pres.len() {
            let next = self.next_pre(slot, count);
            let span = next.checked_sub(self.first_pres[slot]).unwrap_or(0);
            if next <= self.first_pres[slot] || span > entries as u64 {
                return corrupted(format!(
                    "slot {slot} spans {}..{next} (capacity {entries})",
                    self.first_pres[slot]
                ));
            }
            if self.blocks[slot] >= nr_blocks {
                return corrupted(format!(
                    "slot {slot} refers to block {} of {nr_blocks}",
                    self.blocks[slot]
                ));
            }
        }
        Ok(())
    }
}
