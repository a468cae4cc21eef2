//! Block management for the table store.
//!
//! This module handles:
//! - The fixed-size block buffer and its big-endian field codec
//! - Block number allocation (monotonic, never reused)
//! - The buffer pool caching resident blocks

mod allocator;
mod pool;

pub use allocator::BlockAllocator;
pub use pool::{BufferPool, PoolStats};

use byteorder::{BigEndian, ByteOrder};

use crate::error::{BlockId, Error, Result};

/// Width of a numeric record field.
///
/// Fields are stored big-endian. The five-byte width packs a 40-bit value
/// for quantities that need more than 32 but never 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldWidth {
    /// One byte.
    One = 1,
    /// Two bytes.
    Two = 2,
    /// Four bytes.
    Four = 4,
    /// Five bytes (40 bits).
    Five = 5,
}

impl FieldWidth {
    /// Number of bytes occupied by the field.
    pub fn bytes(self) -> usize {
        self as usize
    }

    /// Largest value representable in this width.
    pub fn max_value(self) -> u64 {
        (1u64 << (8 * self.bytes())) - 1
    }
}

impl TryFrom<usize> for FieldWidth {
    type Error = Error;

    fn try_from(width: usize) -> Result<Self> {
        match width {
            1 => Ok(FieldWidth::One),
            2 => Ok(FieldWidth::Two),
            4 => Ok(FieldWidth::Four),
            5 => Ok(FieldWidth::Five),
            _ => Err(Error::InvalidFieldWidth { width }),
        }
    }
}

/// A fixed-size buffer holding one block of records.
///
/// Byte positions passed to the accessors are relative to the block start;
/// callers are responsible for keeping them inside the block.
#[derive(Clone)]
pub struct Block {
    /// Block number currently held, `None` for a never-assigned buffer.
    pub id: Option<BlockId>,
    /// Raw block bytes.
    pub data: Vec<u8>,
    /// Whether the buffer holds changes not yet written to the data file.
    pub dirty: bool,
}

impl Block {
    /// Creates an unassigned, zeroed buffer.
    pub fn new(block_size: usize) -> Self {
        Self { id: None, data: vec![0u8; block_size], dirty: false }
    }

    /// Reads a big-endian unsigned field at byte position `pos`.
    pub fn read_field(&self, pos: usize, width: FieldWidth) -> u64 {
        let buf = &self.data[pos..pos + width.bytes()];
        match width {
            FieldWidth::One => u64::from(buf[0]),
            FieldWidth::Two => u64::from(BigEndian::read_u16(buf)),
            FieldWidth::Four => u64::from(BigEndian::read_u32(buf)),
            FieldWidth::Five => BigEndian::read_uint(buf, 5),
        }
    }

    /// Writes a big-endian unsigned field at byte position `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldOverflow`] if `value` exceeds the width; the
    /// buffer is left untouched in that case.
    pub fn write_field(&mut self, pos: usize, width: FieldWidth, value: u64) -> Result<()> {
        if value > width.max_value() {
            return Err(Error::FieldOverflow { value, width: width.bytes() });
        }
        let buf = &mut self.data[pos..pos + width.bytes()];
        match width {
            FieldWidth::One => buf[0] = value as u8,
            FieldWidth::Two => BigEndian::write_u16(buf, value as u16),
            FieldWidth::Four => BigEndian::write_u32(buf, value as u32),
            FieldWidth::Five => BigEndian::write_uint(buf, value, 5),
        }
        self.dirty = true;
        Ok(())
    }

    /// Moves `len` bytes from `src` to `dst` within the block.
    pub fn shift(&mut self, src: usize, dst: usize, len: usize) {
        if len > 0 && src != dst {
            self.data.copy_within(src..src + len, dst);
        }
        self.dirty = true;
    }

    /// Copies `bytes` into the block starting at `pos`.
    pub fn put(&mut self, pos: usize, bytes: &[u8]) {
        self.data[pos..pos + bytes.len()].copy_from_slice(bytes);
        self.dirty = true;
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("size", &self.data.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}
