//! Storage backend abstraction for the table store.
//!
//! A table is persisted as two artifacts:
//!
//! - the **data file**, a raw sequence of fixed-size blocks without header,
//!   where block `n` lives at byte offset `n × block_size`;
//! - the **sidecar index**, the serialized firstPre → block mapping (see
//!   [`crate::index::IndexFile`]), rewritten in full on every flush.
//!
//! The trait abstracts both, allowing file-based (production) and in-memory
//! (testing) implementations.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::InMemoryBackend;

use crate::error::{BlockId, Result};

/// Storage backend trait for abstracting table I/O.
pub trait BlockBackend: Send + Sync {
    /// Reads the complete sidecar index.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the read fails.
    fn read_index(&self) -> Result<Vec<u8>>;

    /// Replaces the sidecar index with `bytes`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the write fails.
    fn write_index(&self, bytes: &[u8]) -> Result<()>;

    /// Reads a block by its number. Blocks never written read as zeros.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the read fails.
    fn read_block(&self, block: BlockId) -> Result<Vec<u8>>;

    /// Writes a block at the given number, extending the data file if needed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the write fails.
    /// Returns `Error::Corrupted` if the data size does not match the block size.
    fn write_block(&self, block: BlockId, data: &[u8]) -> Result<()>;

    /// Flushes all block writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the sync fails.
    fn sync(&self) -> Result<()>;

    /// Returns the block size for this backend.
    fn block_size(&self) -> usize;

    /// Calculates the byte offset of a block in the data file.
    fn block_offset(&self, block: BlockId) -> u64 {
        block * self.block_size() as u64
    }
}
