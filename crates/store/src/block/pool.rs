//! Buffer pool for the table store.
//!
//! Holds a handful of resident blocks. On a miss the slot after the current
//! one is reassigned (round-robin). A dirty slot is written back before the
//! requested block is read into it, and a block number is never resident in
//! more than one slot.

use super::Block;
use crate::{
    backend::BlockBackend,
    error::{BlockId, Result},
};

/// Fixed-capacity pool of block buffers with a current slot.
pub struct BufferPool {
    /// Buffer slots.
    buffers: Vec<Block>,
    /// Index of the current slot.
    current: usize,
    /// Requests served by a resident buffer.
    hits: u64,
    /// Requests that had to load a block from disk.
    misses: u64,
}

impl BufferPool {
    /// Creates a pool with `capacity` buffers of `block_size` bytes.
    pub fn new(capacity: usize, block_size: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffers: (0..capacity).map(|_| Block::new(block_size)).collect(),
            current: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Makes `block` the current buffer, loading it from `backend` if needed.
    ///
    /// Returns `true` if the block had to be read from disk and `false` if it
    /// was already resident.
    ///
    /// # Errors
    ///
    /// Returns an error if writing back the replaced buffer or reading the
    /// requested block fails. The pool is unchanged apart from a successful
    /// write-back having cleared the replaced buffer's dirty flag.
    pub fn cursor<B: BlockBackend>(&mut self, backend: &B, block: BlockId) -> Result<bool> {
        if let Some(slot) = self.find(block) {
            self.current = slot;
            self.hits += 1;
            return Ok(false);
        }

        let slot = self.victim();
        self.write_back(backend, slot)?;
        let data = backend.read_block(block)?;

        let buffer = &mut self.buffers[slot];
        buffer.data = data;
        buffer.id = Some(block);
        buffer.dirty = false;
        self.current = slot;
        self.misses += 1;
        Ok(true)
    }

    /// Makes a zeroed buffer for the newly allocated `block` current.
    ///
    /// The buffer starts dirty so the block reaches the data file on flush
    /// even if nothing else is written to it.
    ///
    /// # Errors
    ///
    /// Returns an error if writing back the replaced buffer fails.
    pub fn assign_new<B: BlockBackend>(&mut self, backend: &B, block: BlockId) -> Result<()> {
        debug_assert!(self.find(block).is_none(), "block {block} already resident");

        let slot = self.victim();
        self.write_back(backend, slot)?;

        let buffer = &mut self.buffers[slot];
        buffer.data.fill(0);
        buffer.id = Some(block);
        buffer.dirty = true;
        self.current = slot;
        Ok(())
    }

    /// Drops `block` from the pool without writing it back.
    pub fn discard(&mut self, block: BlockId) {
        if let Some(slot) = self.find(block) {
            let buffer = &mut self.buffers[slot];
            buffer.id = None;
            buffer.dirty = false;
        }
    }

    /// Returns the current buffer.
    pub fn current(&self) -> &Block {
        &self.buffers[self.current]
    }

    /// Returns the current buffer for modification.
    pub fn current_mut(&mut self) -> &mut Block {
        &mut self.buffers[self.current]
    }

    /// Returns every buffer slot.
    pub fn all(&self) -> &[Block] {
        &self.buffers
    }

    /// Writes all dirty buffers to `backend`.
    ///
    /// Returns the number of buffers written.
    ///
    /// # Errors
    ///
    /// Returns the first write error; buffers written before it are clean.
    pub fn flush<B: BlockBackend>(&mut self, backend: &B) -> Result<usize> {
        let mut written = 0;
        for slot in 0..self.buffers.len() {
            if self.buffers[slot].dirty {
                self.write_back(backend, slot)?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.buffers.len(),
            resident: self.buffers.iter().filter(|b| b.id.is_some()).count(),
            dirty: self.buffers.iter().filter(|b| b.dirty).count(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    fn find(&self, block: BlockId) -> Option<usize> {
        let len = self.buffers.len();
        (0..len).map(|i| (self.current + i) % len).find(|&slot| self.buffers[slot].id == Some(block))
    }

    fn victim(&self) -> usize {
        (self.current + 1) % self.buffers.len()
    }

    fn write_back<B: BlockBackend>(&mut self, backend: &B, slot: usize) -> Result<()> {
        let buffer = &mut self.buffers[slot];
        if let (true, Some(id)) = (buffer.dirty, buffer.id) {
            backend.write_block(id, &buffer.data)?;
            buffer.dirty = false;
        }
        Ok(())
    }
}

/// Buffer pool statistics.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Number of buffer slots.
    pub capacity: usize,
    /// Slots currently holding a block.
    pub resident: usize,
    /// Slots with unwritten changes.
    pub dirty: usize,
    /// Requests served without I/O.
    pub hits: u64,
    /// Requests that loaded a block.
    pub misses: u64,
}
