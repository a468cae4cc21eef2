//! Table store configuration.

use crate::error::{Error, Result};

/// Default block size: 4KB.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default record size: 16 bytes.
pub const DEFAULT_RECORD_SIZE: usize = 16;

/// Default number of resident buffers.
pub const DEFAULT_BUFFERS: usize = 4;

/// Default fraction of block capacity used when allocating blocks on a split.
pub const DEFAULT_FILL_RATIO: f64 = 0.75;

/// Table store configuration options.
///
/// Block and record geometry is not persisted with the table; the same
/// values must be supplied on every open.
///
/// ```
/// use pretable_store::TableConfig;
///
/// let config = TableConfig::builder().block_size(32).record_size(8).build();
/// assert_eq!(config.entries(), 4);
/// ```
#[derive(Debug, Clone, bon::Builder)]
pub struct TableConfig {
    /// Block size in bytes (unit of disk I/O).
    #[builder(default = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,
    /// Record size in bytes.
    #[builder(default = DEFAULT_RECORD_SIZE)]
    pub record_size: usize,
    /// Number of blocks held in the buffer pool.
    #[builder(default = DEFAULT_BUFFERS)]
    pub buffers: usize,
    /// Target fill of newly allocated blocks, in `(0, 1]`.
    #[builder(default = DEFAULT_FILL_RATIO)]
    pub fill_ratio: f64,
    /// Whether `flush()` syncs the data file to durable storage.
    #[builder(default = true)]
    pub sync_on_flush: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            record_size: DEFAULT_RECORD_SIZE,
            buffers: DEFAULT_BUFFERS,
            fill_ratio: DEFAULT_FILL_RATIO,
            sync_on_flush: true,
        }
    }
}

impl TableConfig {
    /// Maximum number of records per block.
    pub fn entries(&self) -> usize {
        self.block_size / self.record_size
    }

    /// Number of records placed in each block created by a split.
    pub fn new_entries(&self) -> usize {
        ((self.entries() as f64 * self.fill_ratio) as usize).max(1)
    }

    /// Checks that all settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first rejected setting.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.record_size == 0 {
            "record size must be positive".to_string()
        } else if self.block_size < self.record_size {
            format!("block size {} smaller than record size {}", self.block_size, self.record_size)
        } else if self.block_size % self.record_size != 0 {
            format!(
                "block size {} is not a multiple of record size {}",
                self.block_size, self.record_size
            )
        } else if self.buffers == 0 {
            "buffer pool needs at least one buffer".to_string()
        } else if !(self.fill_ratio > 0.0 && self.fill_ratio <= 1.0) {
            format!("fill ratio {} outside (0, 1]", self.fill_ratio)
        } else {
            return Ok(());
        };
        Err(Error::InvalidConfig { reason })
    }
}
