//! In-memory storage backend for testing.

use std::{
    collections::HashMap,
    io,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::RwLock;

use super::BlockBackend;
use crate::{
    config::DEFAULT_BLOCK_SIZE,
    error::{BlockId, Error, Result},
};

/// In-memory storage backend for testing.
///
/// All data is stored in memory and lost when the backend is dropped.
/// Writes can be made to fail on demand to exercise error propagation.
pub struct InMemoryBackend {
    /// The serialized sidecar index.
    index: RwLock<Vec<u8>>,
    /// Blocks indexed by block number.
    blocks: RwLock<HashMap<BlockId, Vec<u8>>>,
    /// Block size in bytes.
    block_size: usize,
    /// When set, every write returns an I/O error.
    fail_writes: AtomicBool,
}

impl InMemoryBackend {
    /// Create a new in-memory backend with default block size.
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Create a new in-memory backend with specified block size.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            index: RwLock::new(Vec::new()),
            blocks: RwLock::new(HashMap::new()),
            block_size,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Number of blocks written so far.
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// Copy of the persisted sidecar index.
    pub fn index_bytes(&self) -> Vec<u8> {
        self.index.read().clone()
    }

    /// Makes subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected write failure").into());
        }
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBackend for InMemoryBackend {
    fn read_index(&self) -> Result<Vec<u8>> {
        Ok(self.index.read().clone())
    }

    fn write_index(&self, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        *self.index.write() = bytes.to_vec();
        Ok(())
    }

    fn read_block(&self, block: BlockId) -> Result<Vec<u8>> {
        let blocks = self.blocks.read();
        match blocks.get(&block) {
            Some(data) => Ok(data.clone()),
            None => Ok(vec![0u8; self.block_size]),
        }
    }

    fn write_block(&self, block: BlockId, data: &[u8]) -> Result<()> {
        if data.len() != self.block_size {
            return Err(Error::Corrupted {
                reason: format!(
                    "Invalid block data size: {} (expected {})",
                    data.len(),
                    self.block_size
                ),
            });
        }
        self.check_writable()?;

        self.blocks.write().insert(block, data.to_vec());
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}
