//! Monotonic block number allocator.
//!
//! Block numbers map directly to offsets in the data file. Numbers of blocks
//! emptied by deletes are not handed out again, so the data file keeps unused
//! space after heavy deletion.

use crate::error::BlockId;

/// Hands out block numbers in increasing order.
#[derive(Debug, Clone, Default)]
pub struct BlockAllocator {
    /// Next block number to allocate; equals the number of blocks ever allocated.
    next_block: BlockId,
}

impl BlockAllocator {
    /// Creates an allocator continuing after `allocated` blocks.
    pub fn new(allocated: BlockId) -> Self {
        Self { next_block: allocated }
    }

    /// Allocates a new block number.
    pub fn allocate(&mut self) -> BlockId {
        let block = self.next_block;
        self.next_block += 1;
        block
    }

    /// Marks the next `n` block numbers as allocated.
    pub fn advance(&mut self, n: BlockId) {
        self.next_block += n;
    }

    /// Returns the number of blocks ever allocated.
    pub fn total_blocks(&self) -> BlockId {
        self.next_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_monotonic() {
        let mut allocator = BlockAllocator::new(3);
        assert_eq!(allocator.allocate(), 3);
        assert_eq!(allocator.allocate(), 4);
        assert_eq!(allocator.total_blocks(), 5);
    }

    #[test]
    fn test_advance_skips_numbers() {
        let mut allocator = BlockAllocator::new(2);
        allocator.advance(3);
        assert_eq!(allocator.total_blocks(), 5);
        assert_eq!(allocator.allocate(), 5);
    }

    #[test]
    fn test_fresh_allocator_starts_at_zero() {
        let mut allocator = BlockAllocator::default();
        assert_eq!(allocator.total_blocks(), 0);
        assert_eq!(allocator.allocate(), 0);
    }
}
