//! Shared table handles with pin counting.
//!
//! Each registered table carries a pin count. Callers pin a table before use
//! and unpin it afterwards; the last unpin closes the table and drops it from
//! the pool.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    backend::BlockBackend,
    error::{Error, Result},
    store::TableStore,
};

struct PoolEntry<B: BlockBackend> {
    table: Arc<TableStore<B>>,
    pins: usize,
}

/// Registry of open tables keyed by name.
pub struct TablePool<B: BlockBackend> {
    tables: Mutex<HashMap<String, PoolEntry<B>>>,
}

impl<B: BlockBackend> TablePool<B> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self { tables: Mutex::new(HashMap::new()) }
    }

    /// Registers `table` under `name` with one pin held by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableInUse`] if a table with that name is registered.
    pub fn add(&self, name: &str, table: TableStore<B>) -> Result<Arc<TableStore<B>>> {
        let mut tables = self.tables.lock();
        if tables.contains_key(name) {
            return Err(Error::TableInUse { name: name.to_string() });
        }
        let table = Arc::new(table);
        tables.insert(name.to_string(), PoolEntry { table: Arc::clone(&table), pins: 1 });
        Ok(table)
    }

    /// Pins the table `name`, returning its handle if registered.
    pub fn pin(&self, name: &str) -> Option<Arc<TableStore<B>>> {
        let mut tables = self.tables.lock();
        let entry = tables.get_mut(name)?;
        entry.pins += 1;
        Some(Arc::clone(&entry.table))
    }

    /// Releases one pin of `name`.
    ///
    /// Returns `true` if this was the last pin; the table has then been
    /// closed and removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableNotFound`] if `name` is not registered, or the
    /// error of the final close. A table that fails to close stays
    /// registered with one pin.
    pub fn unpin(&self, name: &str) -> Result<bool> {
        let mut tables = self.tables.lock();
        let entry =
            tables.get_mut(name).ok_or_else(|| Error::TableNotFound { name: name.to_string() })?;
        if entry.pins > 1 {
            entry.pins -= 1;
            return Ok(false);
        }

        entry.table.close()?;
        tables.remove(name);
        tracing::debug!(table = name, "Released last pin");
        Ok(true)
    }

    /// Number of pins held on `name` (zero if not registered).
    pub fn pins(&self, name: &str) -> usize {
        self.tables.lock().get(name).map_or(0, |entry| entry.pins)
    }

    /// Checks if `name` is registered.
    pub fn is_pinned(&self, name: &str) -> bool {
        self.pins(name) > 0
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    /// Checks if no table is registered.
    pub fn is_empty(&self) -> bool {
        self.tables.lock().is_empty()
    }

    /// Closes and removes every table regardless of pins.
    ///
    /// # Errors
    ///
    /// Returns the first close error after attempting every table.
    pub fn close_all(&self) -> Result<()> {
        let drained: Vec<_> = self.tables.lock().drain().collect();
        let mut first_error = None;
        for (name, entry) in drained {
            if entry.pins > 1 {
                tracing::warn!(table = %name, pins = entry.pins, "Closing table that is still pinned");
            }
            if let Err(e) = entry.table.close() {
                tracing::warn!(table = %name, error = %e, "Failed to close table");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<B: BlockBackend> Default for TablePool<B> {
    fn default() -> Self {
        Self::new()
    }
}
