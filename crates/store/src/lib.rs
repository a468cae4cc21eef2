//! pretable-store: block-based disk access for position-addressed record tables.
//!
//! A table is a logically contiguous sequence of fixed-width records, stored
//! on disk in fixed-size blocks and addressed by logical position ("pre"):
//!
//! - **Positioned field access**: 1, 2, 4 and 5 byte big-endian fields
//! - **Structural updates**: insert and delete record ranges anywhere
//! - **Partially filled blocks**: splits leave headroom for later inserts
//! - **Deferred persistence**: dirty blocks and the sidecar index are written
//!   on flush
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 TablePool                    │
//! │          (name → table, pin/unpin)          │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │                TableStore                    │
//! │ (read/write fields, insert, delete, flush)  │
//! └───────┬─────────────────────────┬───────────┘
//!         │                         │
//! ┌───────▼──────────┐    ┌─────────▼───────────┐
//! │    BlockIndex     │    │     BufferPool      │
//! │ (firstPre→block,  │    │ (resident blocks,   │
//! │  seeded search)   │    │  write-back)        │
//! └───────┬──────────┘    └─────────┬───────────┘
//!         │                         │
//! ┌───────▼─────────────────────────▼───────────┐
//! │              Storage Backend                 │
//! │      (FileBackend / InMemoryBackend)        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use pretable_store::{TableConfig, TableStore};
//!
//! let config = TableConfig::builder().block_size(64).record_size(8).build();
//! let table = TableStore::open_in_memory(config)?;
//!
//! table.insert(0, &[0u8; 24])?;
//! table.write5(2, 0, 1 << 39)?;
//! table.delete(0, 1)?;
//! assert_eq!(table.read5(1, 0)?, 1 << 39);
//! # Ok::<(), pretable_store::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
// Position arithmetic converts between u64 positions and usize offsets
// bounded by the block size.
#![allow(clippy::cast_possible_truncation)]

pub mod backend;
pub mod block;
pub mod config;
pub mod error;
pub mod index;
pub mod pool;
pub mod store;

// Re-export commonly used types
pub use backend::{BlockBackend, FileBackend, InMemoryBackend};
pub use block::{Block, BlockAllocator, BufferPool, FieldWidth, PoolStats};
pub use config::TableConfig;
pub use error::{BlockId, Error, Pre, Result};
pub use index::{BlockIndex, IndexFile, Located};
pub use pool::TablePool;
pub use store::{DATA_EXTENSION, INDEX_EXTENSION, TableStats, TableStore, table_paths};
