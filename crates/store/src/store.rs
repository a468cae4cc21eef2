//! The table store: positioned field access and structural updates over a
//! block-organized record table.
//!
//! # Example
//!
//! ```no_run
//! use pretable_store::{TableConfig, TableStore};
//!
//! let config = TableConfig::builder().record_size(16).build();
//! let table = TableStore::create("/var/lib/pretable", "nodes", config.clone())?;
//!
//! table.insert(0, &[0u8; 32])?;
//! table.write4(1, 0, 0xCAFE_BABE)?;
//! table.close()?;
//!
//! let table = TableStore::open("/var/lib/pretable", "nodes", config)?;
//! assert_eq!(table.read4(1, 0)?, 0xCAFE_BABE);
//! # Ok::<(), pretable_store::Error>(())
//! ```

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::{
    backend::{BlockBackend, FileBackend, InMemoryBackend},
    block::{BlockAllocator, BufferPool, FieldWidth},
    config::TableConfig,
    error::{BlockId, Error, Pre, Result},
    index::{BlockIndex, IndexFile, Located},
};

/// File extension of the block data file.
pub const DATA_EXTENSION: &str = "tbl";

/// File extension of the sidecar index file.
pub const INDEX_EXTENSION: &str = "tbi";

/// Returns the data file and sidecar index paths of table `name` in `dir`.
pub fn table_paths(dir: impl AsRef<Path>, name: &str) -> (PathBuf, PathBuf) {
    let dir = dir.as_ref();
    (
        dir.join(format!("{name}.{DATA_EXTENSION}")),
        dir.join(format!("{name}.{INDEX_EXTENSION}")),
    )
}

/// A disk-resident table of fixed-width records addressed by position.
///
/// Generic over [`BlockBackend`]: use [`TableStore<FileBackend>`] for
/// production and [`TableStore<InMemoryBackend>`] for testing.
///
/// All operations take `&self` and are serialized by one instance-wide lock;
/// cursor position, buffer assignment and index shape are never observed
/// mid-change. Changes stay in memory until [`flush`](Self::flush) or
/// [`close`](Self::close).
pub struct TableStore<B: BlockBackend> {
    /// Open table state; `None` once closed.
    state: Mutex<Option<TableState<B>>>,
    /// Configuration the table was opened with.
    config: TableConfig,
    /// Label used in log events.
    label: String,
}

impl TableStore<FileBackend> {
    /// Creates an empty table named `name` in `dir`, replacing existing files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is unusable.
    /// Returns [`Error::Io`] if the files cannot be created.
    pub fn create(dir: impl AsRef<Path>, name: &str, config: TableConfig) -> Result<Self> {
        config.validate()?;
        let (data_path, index_path) = table_paths(dir, name);
        let backend = FileBackend::create(&data_path, &index_path, config.block_size)?;
        Self::create_with_backend(backend, config, data_path.display().to_string())
    }

    /// Opens the existing table `name` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if either file cannot be opened or read.
    /// Returns [`Error::Corrupted`] if the sidecar index is truncated or
    /// inconsistent.
    pub fn open(dir: impl AsRef<Path>, name: &str, config: TableConfig) -> Result<Self> {
        config.validate()?;
        let (data_path, index_path) = table_paths(dir, name);
        let backend = FileBackend::open(&data_path, &index_path, config.block_size)?;
        Self::load(backend, config, data_path.display().to_string())
    }
}

impl TableStore<InMemoryBackend> {
    /// Creates an empty in-memory table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is unusable.
    pub fn open_in_memory(config: TableConfig) -> Result<Self> {
        config.validate()?;
        let backend = InMemoryBackend::with_block_size(config.block_size);
        Self::create_with_backend(backend, config, "memory".to_string())
    }
}

impl<B: BlockBackend> TableStore<B> {
    /// Initializes an empty table on `backend` and persists its index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is unusable or
    /// does not match the backend's block size.
    /// Returns [`Error::Io`] if the empty index cannot be written.
    pub fn create_with_backend(backend: B, config: TableConfig, label: String) -> Result<Self> {
        config.validate()?;
        backend.write_index(&IndexFile::default().encode())?;
        Self::load(backend, config, label)
    }

    /// Opens a table from the index and blocks already held by `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is unusable or
    /// does not match the backend's block size.
    /// Returns [`Error::Corrupted`] if the index is truncated or inconsistent.
    /// Returns [`Error::Io`] if reading fails.
    pub fn from_backend(backend: B, config: TableConfig) -> Result<Self> {
        Self::load(backend, config, "table".to_string())
    }

    fn load(backend: B, config: TableConfig, label: String) -> Result<Self> {
        config.validate()?;
        if backend.block_size() != config.block_size {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "backend block size {} differs from configured {}",
                    backend.block_size(),
                    config.block_size
                ),
            });
        }

        let file = IndexFile::decode(&backend.read_index()?)?;
        let (count, nr_blocks) = (file.count, file.nr_blocks);
        let index = file.into_index()?;
        index.check(count, nr_blocks, config.entries())?;

        let mut state = TableState {
            pool: BufferPool::new(config.buffers, config.block_size),
            allocator: BlockAllocator::new(nr_blocks),
            index,
            count,
            dirty: false,
            splits: 0,
            record_size: config.record_size,
            entries: config.entries(),
            new_entries: config.new_entries(),
            sync_on_flush: config.sync_on_flush,
            backend,
        };
        if !state.index.is_empty() {
            let first = state.index.block(0);
            state.pool.cursor(&state.backend, first)?;
        }

        tracing::info!(table = %label, count, blocks = state.index.len(), "Opened table");
        Ok(Self { state: Mutex::new(Some(state)), config, label })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut TableState<B>) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(Error::Closed)?;
        f(state)
    }

    /// Returns the configuration the table was opened with.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Checks whether the table is still open.
    pub fn is_open(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Reads the `width`-byte big-endian field at `offset` of record `pre`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PositionOutOfRange`] if `pre` is not a record,
    /// [`Error::FieldOutOfBounds`] if the field exceeds the record, or
    /// [`Error::Io`] if loading the block fails.
    pub fn read_field(&self, pre: Pre, offset: usize, width: FieldWidth) -> Result<u64> {
        self.with_state(|state| {
            let pos = state.field_pos(pre, offset, width)?;
            Ok(state.pool.current().read_field(pos, width))
        })
    }

    /// Writes the `width`-byte big-endian field at `offset` of record `pre`.
    ///
    /// The block is only marked dirty; nothing is persisted before a flush.
    ///
    /// # Errors
    ///
    /// As [`read_field`](Self::read_field), plus [`Error::FieldOverflow`] if
    /// `value` does not fit into `width`.
    pub fn write_field(&self, pre: Pre, offset: usize, width: FieldWidth, value: u64) -> Result<()> {
        if value > width.max_value() {
            return Err(Error::FieldOverflow { value, width: width.bytes() });
        }
        self.with_state(|state| {
            let pos = state.field_pos(pre, offset, width)?;
            state.pool.current_mut().write_field(pos, width, value)
        })
    }

    /// Reads a one-byte field.
    ///
    /// # Errors
    ///
    /// See [`read_field`](Self::read_field).
    pub fn read1(&self, pre: Pre, offset: usize) -> Result<u8> {
        Ok(self.read_field(pre, offset, FieldWidth::One)? as u8)
    }

    /// Reads a two-byte field.
    ///
    /// # Errors
    ///
    /// See [`read_field`](Self::read_field).
    pub fn read2(&self, pre: Pre, offset: usize) -> Result<u16> {
        Ok(self.read_field(pre, offset, FieldWidth::Two)? as u16)
    }

    /// Reads a four-byte field.
    ///
    /// # Errors
    ///
    /// See [`read_field`](Self::read_field).
    pub fn read4(&self, pre: Pre, offset: usize) -> Result<u32> {
        Ok(self.read_field(pre, offset, FieldWidth::Four)? as u32)
    }

    /// Reads a five-byte (40-bit) field.
    ///
    /// # Errors
    ///
    /// See [`read_field`](Self::read_field).
    pub fn read5(&self, pre: Pre, offset: usize) -> Result<u64> {
        self.read_field(pre, offset, FieldWidth::Five)
    }

    /// Writes a one-byte field.
    ///
    /// # Errors
    ///
    /// See [`write_field`](Self::write_field).
    pub fn write1(&self, pre: Pre, offset: usize, value: u8) -> Result<()> {
        self.write_field(pre, offset, FieldWidth::One, u64::from(value))
    }

    /// Writes a two-byte field.
    ///
    /// # Errors
    ///
    /// See [`write_field`](Self::write_field).
    pub fn write2(&self, pre: Pre, offset: usize, value: u16) -> Result<()> {
        self.write_field(pre, offset, FieldWidth::Two, u64::from(value))
    }

    /// Writes a four-byte field.
    ///
    /// # Errors
    ///
    /// See [`write_field`](Self::write_field).
    pub fn write4(&self, pre: Pre, offset: usize, value: u32) -> Result<()> {
        self.write_field(pre, offset, FieldWidth::Four, u64::from(value))
    }

    /// Writes a five-byte (40-bit) field.
    ///
    /// # Errors
    ///
    /// See [`write_field`](Self::write_field); values above `2^40 - 1` are
    /// rejected with [`Error::FieldOverflow`].
    pub fn write5(&self, pre: Pre, offset: usize, value: u64) -> Result<()> {
        self.write_field(pre, offset, FieldWidth::Five, value)
    }

    /// Copies the raw bytes of `n` records starting at `pre`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PositionOutOfRange`] if the range exceeds the table,
    /// or [`Error::Io`] if loading a block fails.
    pub fn records(&self, pre: Pre, n: u64) -> Result<Vec<u8>> {
        self.with_state(|state| state.records(pre, n))
    }

    /// Inserts the records in `records` so the first one lands at `pre`.
    ///
    /// Records at positions `>= pre` move up by the number of inserted
    /// records. `pre` may equal the record count to append.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnalignedRecords`] if `records` is not a whole number
    /// of records, [`Error::PositionOutOfRange`] if `pre` exceeds the count,
    /// or [`Error::Io`] if buffer replacement fails.
    pub fn insert(&self, pre: Pre, records: &[u8]) -> Result<()> {
        self.with_state(|state| state.insert(&self.label, pre, records))
    }

    /// Deletes `n` consecutive records starting at `pre`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PositionOutOfRange`] if the range exceeds the table,
    /// or [`Error::Io`] if buffer replacement fails.
    pub fn delete(&self, pre: Pre, n: u64) -> Result<()> {
        self.with_state(|state| state.delete(&self.label, pre, n))
    }

    /// Finds the block owning `pre` without loading it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAccess`] if no block owns `pre`.
    pub fn locate(&self, pre: Pre) -> Result<Located> {
        self.with_state(|state| state.index.locate(pre, state.count))
    }

    /// Writes dirty blocks and, if changed, the sidecar index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a write or sync fails; the index stays dirty.
    pub fn flush(&self) -> Result<()> {
        self.with_state(|state| state.flush(&self.label))
    }

    /// Flushes and releases the table. Calling `close` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the final flush fails; the table stays open.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let Some(state) = guard.as_mut() else {
            return Ok(());
        };
        state.flush(&self.label)?;
        let count = state.count;
        *guard = None;
        tracing::info!(table = %self.label, count, "Closed table");
        Ok(())
    }

    /// Returns the number of records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close).
    pub fn size(&self) -> Result<Pre> {
        self.with_state(|state| Ok(state.count))
    }

    /// Returns the number of live blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close).
    pub fn blocks(&self) -> Result<usize> {
        self.with_state(|state| Ok(state.index.len()))
    }

    /// Returns a copy of the block index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close).
    pub fn index(&self) -> Result<BlockIndex> {
        self.with_state(|state| Ok(state.index.clone()))
    }

    /// Verifies the index invariants against the current record count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] naming the violated invariant.
    pub fn check_invariants(&self) -> Result<()> {
        self.with_state(|state| {
            state.index.check(state.count, state.allocator.total_blocks(), state.entries)
        })
    }

    /// Returns table statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close).
    pub fn stats(&self) -> Result<TableStats> {
        self.with_state(|state| {
            let pool = state.pool.stats();
            Ok(TableStats {
                count: state.count,
                index_size: state.index.len(),
                total_blocks: state.allocator.total_blocks(),
                resident_buffers: pool.resident,
                dirty_buffers: pool.dirty,
                index_dirty: state.dirty,
                buffer_hits: pool.hits,
                buffer_misses: pool.misses,
                splits: state.splits,
            })
        })
    }
}

impl<B: BlockBackend> Drop for TableStore<B> {
    fn drop(&mut self) {
        if let Some(state) = self.state.get_mut() {
            if state.dirty || state.pool.stats().dirty > 0 {
                tracing::warn!(table = %self.label, "Table dropped with unflushed changes");
            }
        }
    }
}

/// Table statistics.
#[derive(Debug, Clone)]
pub struct TableStats {
    /// Number of records.
    pub count: Pre,
    /// Number of live blocks.
    pub index_size: usize,
    /// Blocks ever allocated in the data file.
    pub total_blocks: BlockId,
    /// Buffers currently holding a block.
    pub resident_buffers: usize,
    /// Buffers with unwritten changes.
    pub dirty_buffers: usize,
    /// Whether the index differs from the persisted sidecar.
    pub index_dirty: bool,
    /// Block requests served from the buffer pool.
    pub buffer_hits: u64,
    /// Block requests that read from the data file.
    pub buffer_misses: u64,
    /// Inserts that had to allocate new blocks.
    pub splits: u64,
}

/// Mutable state of an open table.
struct TableState<B> {
    backend: B,
    pool: BufferPool,
    index: BlockIndex,
    allocator: BlockAllocator,
    /// Number of records.
    count: Pre,
    /// Index changed since the last flush.
    dirty: bool,
    splits: u64,
    record_size: usize,
    /// Maximum records per block.
    entries: usize,
    /// Records per block created by a split.
    new_entries: usize,
    sync_on_flush: bool,
}

impl<B: BlockBackend> TableState<B> {
    /// Locates `pre` and makes its block the current buffer.
    fn cursor(&mut self, pre: Pre) -> Result<Located> {
        let located = self.index.locate(pre, self.count)?;
        self.pool.cursor(&self.backend, self.index.block(located.slot))?;
        Ok(located)
    }

    /// Positions on `pre` and returns the byte position of the field.
    fn field_pos(&mut self, pre: Pre, offset: usize, width: FieldWidth) -> Result<usize> {
        if !offset.checked_add(width.bytes()).is_some_and(|end| end <= self.record_size) {
            return Err(Error::FieldOutOfBounds {
                offset,
                width: width.bytes(),
                record_size: self.record_size,
            });
        }
        if pre >= self.count {
            return Err(Error::PositionOutOfRange { pre, count: self.count });
        }
        let located = self.cursor(pre)?;
        Ok((pre - located.first_pre) as usize * self.record_size + offset)
    }

    fn check_range(&self, pre: Pre, n: u64) -> Result<()> {
        if pre >= self.count || n > self.count - pre {
            return Err(Error::PositionOutOfRange {
                pre: pre.saturating_add(n).saturating_sub(1).max(pre),
                count: self.count,
            });
        }
        Ok(())
    }

    fn records(&mut self, pre: Pre, n: u64) -> Result<Vec<u8>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.check_range(pre, n)?;

        let rs = self.record_size;
        let end = pre + n;
        let mut out = Vec::with_capacity(n as usize * rs);
        let mut pos = pre;
        while pos < end {
            let located = self.cursor(pos)?;
            let from = (pos - located.first_pre) as usize;
            let to = (located.next_pre.min(end) - located.first_pre) as usize;
            out.extend_from_slice(&self.pool.current().data[from * rs..to * rs]);
            pos = located.next_pre.min(end);
        }
        Ok(out)
    }

    fn insert(&mut self, label: &str, pre: Pre, records: &[u8]) -> Result<()> {
        let rs = self.record_size;
        if records.len() % rs != 0 {
            return Err(Error::UnalignedRecords { len: records.len(), record_size: rs });
        }
        if pre > self.count {
            return Err(Error::PositionOutOfRange { pre, count: self.count });
        }
        let n = records.len() / rs;
        if n == 0 {
            return Ok(());
        }

        if self.index.is_empty() {
            self.split(label, None, pre, records)?;
        } else {
            // Insertion happens behind the record preceding `pre`.
            let located = self.cursor(pre.saturating_sub(1))?;
            let used = located.len();
            if used + n <= self.entries {
                let ins = (pre - located.first_pre) as usize;
                let block = self.pool.current_mut();
                block.shift(ins * rs, (ins + n) * rs, (used - ins) * rs);
                block.put(ins * rs, records);
                self.index.shift_first_pres(located.slot + 1, n as i64);
            } else {
                self.split(label, Some(located), pre, records)?;
            }
        }

        self.count += n as u64;
        self.dirty = true;
        Ok(())
    }

    /// Places `records` into freshly allocated blocks.
    ///
    /// Records of the split block at or behind `pre` are moved into one more
    /// new block after the inserted ones. The index is changed only after
    /// every new block has been assigned.
    fn split(
        &mut self,
        label: &str,
        located: Option<Located>,
        pre: Pre,
        records: &[u8],
    ) -> Result<()> {
        let rs = self.record_size;
        let n = (records.len() / rs) as u64;

        let (slot, rest) = match located {
            None => (0, Vec::new()),
            // Only an insert at position 0 starts at a block's first record;
            // that block stays intact behind the new ones.
            Some(loc) if pre == loc.first_pre => (loc.slot, Vec::new()),
            Some(loc) => {
                let ins = (pre - loc.first_pre) as usize;
                let rest = self.pool.current().data[ins * rs..loc.len() * rs].to_vec();
                (loc.slot + 1, rest)
            }
        };

        // Block numbers are taken for real only once every buffer is assigned.
        let base = self.allocator.total_blocks();
        let chunk = self.new_entries * rs;
        let mut parts: Vec<(Pre, &[u8])> = records
            .chunks(chunk)
            .enumerate()
            .map(|(i, part)| (pre + (i * self.new_entries) as u64, part))
            .collect();
        if !rest.is_empty() {
            parts.push((pre + n, &rest));
        }

        let mut entries = Vec::with_capacity(parts.len());
        for (i, &(first_pre, part)) in parts.iter().enumerate() {
            let block = base + i as u64;
            if let Err(e) = self.pool.assign_new(&self.backend, block) {
                for &(_, assigned) in &entries {
                    self.pool.discard(assigned);
                }
                return Err(e);
            }
            self.pool.current_mut().put(0, part);
            entries.push((first_pre, block));
        }
        self.allocator.advance(entries.len() as u64);

        self.index.shift_first_pres(slot, n as i64);
        self.index.insert_entries(slot, &entries);
        self.splits += 1;

        tracing::debug!(
            table = label,
            slot,
            new_blocks = entries.len(),
            moved = rest.len() / rs,
            "Split block on insert"
        );
        Ok(())
    }

    fn delete(&mut self, label: &str, pre: Pre, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        self.check_range(pre, n)?;

        let rs = self.record_size;
        let last = pre + n;
        let first = self.cursor(pre)?;
        let from = (pre - first.first_pre) as usize;

        if last <= first.next_pre {
            // Range inside one block: close the gap.
            let tail = (first.next_pre - last) as usize;
            self.pool.current_mut().shift(from * rs + n as usize * rs, from * rs, tail * rs);
            self.index.shift_first_pres(first.slot + 1, -(n as i64));
            if first.len() as u64 == n {
                self.index.remove_range(first.slot, 1);
                tracing::debug!(table = label, slot = first.slot, "Removed emptied block");
            }
        } else {
            // Blocks between the first and the last affected one are dropped
            // entirely; so is the first one if the range starts at its head.
            let end = self.cursor(last - 1)?;
            let start = if from == 0 { first.slot } else { first.slot + 1 };
            let keep = if last == end.next_pre {
                end.slot + 1
            } else {
                let skip = (last - end.first_pre) as usize;
                let tail = (end.next_pre - last) as usize;
                self.pool.current_mut().shift(skip * rs, 0, tail * rs);
                // Shifted down to `pre` with all following entries below.
                self.index.set_first_pre(end.slot, last);
                end.slot
            };
            self.index.shift_first_pres(keep, -(n as i64));
            self.index.remove_range(start, keep - start);
            tracing::debug!(table = label, removed = keep - start, "Removed blocks on delete");
        }

        self.count -= n;
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self, label: &str) -> Result<()> {
        let written = self.pool.flush(&self.backend)?;
        if written > 0 && self.sync_on_flush {
            self.backend.sync()?;
        }

        let index_written = self.dirty;
        if self.dirty {
            let file = IndexFile::from_index(&self.index, self.count, self.allocator.total_blocks());
            self.backend.write_index(&file.encode())?;
            self.dirty = false;
        }

        tracing::debug!(table = label, blocks_written = written, index_written, "Flushed table");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const RS: usize = 8;

    fn small_config(fill_ratio: f64) -> TableConfig {
        TableConfig::builder().block_size(32).record_size(RS).buffers(2).fill_ratio(fill_ratio).build()
    }

    /// One record per letter: the letter in byte 0, its index in bytes 1..5.
    fn records(letters: &str) -> Vec<u8> {
        letters
            .bytes()
            .enumerate()
            .flat_map(|(i, c)| {
                let mut rec = [0u8; RS];
                rec[0] = c;
                rec[1..5].copy_from_slice(&(i as u32).to_be_bytes());
                rec
            })
            .collect()
    }

    fn letters<B: BlockBackend>(table: &TableStore<B>) -> String {
        let n = table.size().unwrap();
        (0..n).map(|pre| table.read1(pre, 0).unwrap() as char).collect()
    }

    #[test]
    fn test_insert_into_empty_table_fills_blocks() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("ABCDE")).unwrap();

        assert_eq!(table.size().unwrap(), 5);
        assert_eq!(table.blocks().unwrap(), 2);
        let index = table.index().unwrap();
        assert_eq!(index.first_pres(), &[0, 4]);
        assert_eq!(letters(&table), "ABCDE");
    }

    #[test]
    fn test_delete_within_block_shifts_following() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("ABCDE")).unwrap();
        table.delete(1, 2).unwrap();

        assert_eq!(table.size().unwrap(), 3);
        assert_eq!(letters(&table), "ADE");
        assert_eq!(table.index().unwrap().first_pres(), &[0, 2]);
        table.check_invariants().unwrap();
    }

    #[test]
    fn test_in_place_insert() {
        let table = TableStore::open_in_memory(small_config(0.5)).unwrap();
        table.insert(0, &records("AB")).unwrap();
        table.insert(1, &records("X")).unwrap();
        table.insert(3, &records("Y")).unwrap();

        assert_eq!(letters(&table), "AXBY");
        assert_eq!(table.blocks().unwrap(), 1);
        assert_eq!(table.stats().unwrap().splits, 1);
    }

    #[test]
    fn test_split_moves_tail_into_new_block() {
        let table = TableStore::open_in_memory(small_config(0.5)).unwrap();
        table.insert(0, &records("ABCD")).unwrap();
        assert_eq!(table.index().unwrap().first_pres(), &[0, 2]);

        // Block 0 holds [A, B]; fill it, then force a split in the middle.
        table.insert(2, &records("xy")).unwrap();
        assert_eq!(letters(&table), "ABxyCD");
        table.insert(1, &records("123")).unwrap();

        assert_eq!(letters(&table), "A123BxyCD");
        let index = table.index().unwrap();
        // [A] [1 2] [3] [B x y] [C D]
        assert_eq!(index.first_pres(), &[0, 1, 3, 4, 7]);
        table.check_invariants().unwrap();
    }

    #[test]
    fn test_insert_at_full_block_boundary_creates_block() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("ABCDEFGH")).unwrap();
        assert_eq!(table.index().unwrap().first_pres(), &[0, 4]);

        table.insert(4, &records("Z")).unwrap();
        assert_eq!(letters(&table), "ABCDZEFGH");

        let located = table.locate(4).unwrap();
        assert_eq!(located.first_pre, 4);
        assert_eq!(located.next_pre, 5);
        assert_eq!(table.index().unwrap().first_pres(), &[0, 4, 5]);
    }

    #[test]
    fn test_insert_at_front_of_full_block() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("ABCD")).unwrap();
        table.insert(0, &records("XY")).unwrap();

        assert_eq!(letters(&table), "XYABCD");
        assert_eq!(table.index().unwrap().first_pres(), &[0, 2]);
        table.check_invariants().unwrap();
    }

    #[test]
    fn test_append_at_end() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        for c in "ABCDEFGHIJ".chars() {
            let pre = table.size().unwrap();
            table.insert(pre, &records(&c.to_string())).unwrap();
        }
        assert_eq!(letters(&table), "ABCDEFGHIJ");
        table.check_invariants().unwrap();
    }

    #[test]
    fn test_delete_whole_block_removes_one_entry() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("ABCDEFGHIJ")).unwrap();
        assert_eq!(table.index().unwrap().first_pres(), &[0, 4, 8]);

        table.delete(4, 4).unwrap();
        assert_eq!(letters(&table), "ABCDIJ");
        assert_eq!(table.index().unwrap().first_pres(), &[0, 4]);
        assert_eq!(table.stats().unwrap().total_blocks, 3);
    }

    #[test]
    fn test_delete_across_blocks() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("ABCDEFGHIJKL")).unwrap();

        // Removes C..J: tail of block 0, all of block 1, head of block 2.
        table.delete(2, 8).unwrap();
        assert_eq!(letters(&table), "ABKL");
        assert_eq!(table.index().unwrap().first_pres(), &[0, 2]);
        table.check_invariants().unwrap();
    }

    #[test]
    fn test_delete_across_blocks_ending_on_boundary() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("ABCDEFGHIJKL")).unwrap();

        table.delete(0, 8).unwrap();
        assert_eq!(letters(&table), "IJKL");
        assert_eq!(table.index().unwrap().first_pres(), &[0]);

        table.delete(0, 4).unwrap();
        assert_eq!(table.size().unwrap(), 0);
        assert_eq!(table.blocks().unwrap(), 0);

        table.insert(0, &records("Q")).unwrap();
        assert_eq!(letters(&table), "Q");
    }

    #[test]
    fn test_records_copy_spans_blocks() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        let data = records("ABCDEFG");
        table.insert(0, &data).unwrap();

        assert_eq!(table.records(2, 4).unwrap(), data[2 * RS..6 * RS].to_vec());
        assert!(table.records(5, 0).unwrap().is_empty());
        assert!(matches!(table.records(5, 3), Err(Error::PositionOutOfRange { .. })));
    }

    #[test]
    fn test_field_access_errors() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("A")).unwrap();

        assert!(matches!(table.read4(1, 0), Err(Error::PositionOutOfRange { pre: 1, count: 1 })));
        assert!(matches!(table.read4(0, 5), Err(Error::FieldOutOfBounds { .. })));
        assert!(matches!(table.write5(0, 0, 1 << 40), Err(Error::FieldOverflow { .. })));
        assert!(matches!(table.insert(0, &[0u8; 5]), Err(Error::UnalignedRecords { .. })));
        assert!(matches!(table.insert(3, &records("B")), Err(Error::PositionOutOfRange { .. })));
        assert!(matches!(table.delete(0, 2), Err(Error::PositionOutOfRange { .. })));
    }

    #[test]
    fn test_field_widths_round_trip() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &[0u8; 4 * RS]).unwrap();

        table.write1(0, 7, 255).unwrap();
        table.write2(1, 6, 65_535).unwrap();
        table.write4(2, 4, u32::MAX).unwrap();
        table.write5(3, 3, (1 << 40) - 1).unwrap();

        assert_eq!(table.read1(0, 7).unwrap(), 255);
        assert_eq!(table.read2(1, 6).unwrap(), 65_535);
        assert_eq!(table.read4(2, 4).unwrap(), u32::MAX);
        assert_eq!(table.read5(3, 3).unwrap(), (1 << 40) - 1);
        assert_eq!(table.read5(0, 0).unwrap(), 0);
    }

    #[test]
    fn test_flush_persists_index_only_when_dirty() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        assert!(!table.stats().unwrap().index_dirty);

        table.insert(0, &records("AB")).unwrap();
        assert!(table.stats().unwrap().index_dirty);
        table.flush().unwrap();

        let stats = table.stats().unwrap();
        assert!(!stats.index_dirty);
        assert_eq!(stats.dirty_buffers, 0);

        // Field writes dirty the buffer, not the index.
        table.write1(0, 1, 9).unwrap();
        let stats = table.stats().unwrap();
        assert!(!stats.index_dirty);
        assert_eq!(stats.dirty_buffers, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("A")).unwrap();

        table.close().unwrap();
        table.close().unwrap();
        assert!(!table.is_open());
        assert!(matches!(table.read1(0, 0), Err(Error::Closed)));
        assert!(matches!(table.size(), Err(Error::Closed)));
    }

    #[test]
    fn test_failed_flush_keeps_table_open() {
        let backend = InMemoryBackend::with_block_size(32);
        let table =
            TableStore::create_with_backend(backend, small_config(1.0), "t".to_string()).unwrap();
        table.insert(0, &records("AB")).unwrap();

        table.with_state(|state| {
            state.backend.fail_writes(true);
            Ok(())
        })
        .unwrap();
        assert!(matches!(table.close(), Err(Error::Io { .. })));
        assert!(table.is_open());
        assert!(table.stats().unwrap().index_dirty);

        table.with_state(|state| {
            state.backend.fail_writes(false);
            Ok(())
        })
        .unwrap();
        table.close().unwrap();
    }

    #[test]
    fn test_huge_field_offset_rejected() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("AB")).unwrap();

        assert!(matches!(table.read1(1, usize::MAX), Err(Error::FieldOutOfBounds { .. })));
        assert!(matches!(table.write4(0, usize::MAX - 1, 7), Err(Error::FieldOutOfBounds { .. })));
        assert_eq!(letters(&table), "AB");
    }

    #[test]
    fn test_out_of_range_is_consistency_fault() {
        let table = TableStore::open_in_memory(small_config(1.0)).unwrap();
        table.insert(0, &records("A")).unwrap();

        let err = table.read1(5, 0).unwrap_err();
        assert!(matches!(err, Error::PositionOutOfRange { pre: 5, count: 1 }));
        assert!(err.is_consistency_fault());
    }

    #[test]
    fn test_failed_split_leaves_state_unchanged() {
        let config = TableConfig::builder()
            .block_size(32)
            .record_size(RS)
            .buffers(2)
            .fill_ratio(1.0)
            .build();
        let backend = InMemoryBackend::with_block_size(32);
        let table = TableStore::create_with_backend(backend, config, "t".to_string()).unwrap();
        table.insert(0, &records("ABCD")).unwrap();
        let before = table.stats().unwrap();

        // The first new block lands in the empty buffer; the second must
        // evict the dirty original block and fails.
        table.with_state(|state| {
            state.backend.fail_writes(true);
            Ok(())
        })
        .unwrap();
        assert!(matches!(table.insert(2, &records("X")), Err(Error::Io { .. })));

        let after = table.stats().unwrap();
        assert_eq!(after.total_blocks, before.total_blocks);
        assert_eq!(after.count, 4);
        assert_eq!(after.splits, before.splits);
        assert_eq!(after.resident_buffers, 1);
        assert_eq!(table.index().unwrap().first_pres(), &[0]);
        assert_eq!(letters(&table), "ABCD");

        table.with_state(|state| {
            state.backend.fail_writes(false);
            Ok(())
        })
        .unwrap();
        table.insert(2, &records("X")).unwrap();
        assert_eq!(letters(&table), "ABXCD");
        assert_eq!(table.stats().unwrap().total_blocks, 3);
        table.check_invariants().unwrap();
    }

    #[test]
    fn test_block_size_mismatch_rejected() {
        let backend = InMemoryBackend::with_block_size(64);
        let result = TableStore::create_with_backend(backend, small_config(1.0), "t".to_string());
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
