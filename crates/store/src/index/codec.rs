//! Sidecar index file format.
//!
//! ```text
//! [nr_blocks][index_size][count][index_size × first_pre][index_size × block]
//! ```
//!
//! Every value is a variable-length unsigned integer. The two top bits of the
//! first byte select the encoded length; the remaining bits and bytes hold
//! the value big-endian:
//!
//! | Tag  | Bytes | Range                 |
//! |------|-------|-----------------------|
//! | `00` | 1     | `0..=0x3F`            |
//! | `01` | 2     | `..=0x3FFF`           |
//! | `10` | 4     | `..=0x3FFF_FFFF`      |
//! | `11` | 1 + 8 | full `u64`            |

use std::{
    collections::HashSet,
    io::{self, Cursor, Read},
};

use byteorder::{BigEndian, ReadBytesExt};

use super::BlockIndex;
use crate::error::{BlockId, Error, Pre, Result};

/// Decoded contents of the sidecar index file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexFile {
    /// Number of blocks ever allocated in the data file.
    pub nr_blocks: BlockId,
    /// Number of records in the table.
    pub count: Pre,
    /// First position of each live block.
    pub first_pres: Vec<Pre>,
    /// Block number of each live block.
    pub blocks: Vec<BlockId>,
}

impl IndexFile {
    /// Captures the persistent state of an index.
    pub fn from_index(index: &BlockIndex, count: Pre, nr_blocks: BlockId) -> Self {
        Self {
            nr_blocks,
            count,
            first_pres: index.first_pres().to_vec(),
            blocks: index.blocks().to_vec(),
        }
    }

    /// Serializes the index file.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 + 4 * (self.first_pres.len() + self.blocks.len()));
        write_num(&mut buf, self.nr_blocks);
        write_num(&mut buf, self.first_pres.len() as u64);
        write_num(&mut buf, self.count);
        for &pre in &self.first_pres {
            write_num(&mut buf, pre);
        }
        for &block in &self.blocks {
            write_num(&mut buf, block);
        }
        buf
    }

    /// Parses and validates an index file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] if the bytes are truncated, carry trailing
    /// data, or describe an inconsistent index.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let nr_blocks = read_num(&mut cursor, "block count")?;
        let index_size = read_num(&mut cursor, "index size")?;
        let count = read_num(&mut cursor, "record count")?;

        if index_size > nr_blocks {
            return Err(Error::Corrupted {
                reason: format!("index size {index_size} exceeds block count {nr_blocks}"),
            });
        }
        // Every value takes at least one byte; reject sizes the input cannot hold.
        let remaining = bytes.len() as u64 - cursor.position();
        if index_size.saturating_mul(2) > remaining {
            return Err(Error::Corrupted {
                reason: format!("index size {index_size} exceeds remaining {remaining} bytes"),
            });
        }

        let size = index_size as usize;
        let first_pres = (0..size)
            .map(|_| read_num(&mut cursor, "first pre"))
            .collect::<Result<Vec<_>>>()?;
        let blocks = (0..size)
            .map(|_| read_num(&mut cursor, "block number"))
            .collect::<Result<Vec<_>>>()?;

        if cursor.position() != bytes.len() as u64 {
            return Err(Error::Corrupted {
                reason: format!(
                    "{} trailing bytes after index",
                    bytes.len() as u64 - cursor.position()
                ),
            });
        }

        let file = Self { nr_blocks, count, first_pres, blocks };
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        let corrupted = |reason: String| Err(Error::Corrupted { reason });

        match self.first_pres.first() {
            None if self.count != 0 => {
                return corrupted(format!("no blocks for {} records", self.count));
            }
            Some(&first) if first != 0 => {
                return corrupted(format!("first block starts at {first}"));
            }
            _ => {}
        }
        if self.first_pres.windows(2).any(|w| w[0] >= w[1]) {
            return corrupted("firstPre values not strictly increasing".to_string());
        }
        if let Some(&last) = self.first_pres.last() {
            if last >= self.count {
                return corrupted(format!(
                    "last block starts at {last} beyond count {}",
                    self.count
                ));
            }
        }

        let mut seen = HashSet::with_capacity(self.blocks.len());
        for &block in &self.blocks {
            if block >= self.nr_blocks {
                return corrupted(format!("block {block} beyond block count {}", self.nr_blocks));
            }
            if !seen.insert(block) {
                return corrupted(format!("block {block} referenced twice"));
            }
        }
        Ok(())
    }

    /// Converts into the in-memory index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] if the arrays differ in length.
    pub fn into_index(self) -> Result<BlockIndex> {
        BlockIndex::from_parts(self.first_pres, self.blocks)
    }
}

fn write_num(buf: &mut Vec<u8>, value: u64) {
    if value <= 0x3F {
        buf.push(value as u8);
    } else if value <= 0x3FFF {
        buf.extend_from_slice(&(value as u16 | 0x4000).to_be_bytes());
    } else if value <= 0x3FFF_FFFF {
        buf.extend_from_slice(&(value as u32 | 0x8000_0000).to_be_bytes());
    } else {
        buf.push(0xC0);
        buf.extend_from_slice(&value.to_be_bytes());
    }
}

fn read_num(cursor: &mut Cursor<&[u8]>, field: &str) -> Result<u64> {
    read_num_raw(cursor).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            Error::Corrupted { reason: format!("truncated index: missing {field}") }
        }
        _ => Error::Io { source: e },
    })
}

fn read_num_raw(reader: &mut impl Read) -> io::Result<u64> {
    let first = reader.read_u8()?;
    let low = u64::from(first & 0x3F);
    Ok(match first >> 6 {
        0 => low,
        1 => (low << 8) | u64::from(reader.read_u8()?),
        2 => (low << 24) | u64::from(reader.read_u24::<BigEndian>()?),
        _ => reader.read_u64::<BigEndian>()?,
    })
}
