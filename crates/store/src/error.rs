//! Error types for the table store.

use std::io;

use snafu::Snafu;

/// Physical block number: the block's offset, in block units, in the data file.
pub type BlockId = u64;

/// Logical record position within the table.
pub type Pre = u64;

/// Result type alias for table store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during table store operations.
#[derive(Debug, Snafu)]
pub enum Error {
    /// I/O error from the underlying storage backend.
    #[snafu(display("I/O error: {source}"))]
    Io {
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Sidecar index is unreadable, truncated or internally inconsistent.
    #[snafu(display("Corrupted table index: {reason}"))]
    Corrupted {
        /// Description of what was corrupted.
        reason: String,
    },

    /// Configuration values are out of range.
    #[snafu(display("Invalid configuration: {reason}"))]
    InvalidConfig {
        /// Description of the rejected setting.
        reason: String,
    },

    /// Access to a logical position outside `[0, count)`.
    #[snafu(display("Position {pre} out of range (count {count})"))]
    PositionOutOfRange {
        /// The requested position.
        pre: Pre,
        /// Number of records in the table.
        count: Pre,
    },

    /// Index search exhausted without finding an owning block.
    #[snafu(display("Invalid data access [pre: {pre}, index size: {index_size}]"))]
    InvalidAccess {
        /// The requested position.
        pre: Pre,
        /// Number of live index entries at the time of the search.
        index_size: usize,
    },

    /// Field lies (partially) outside the record.
    #[snafu(display(
        "Field at offset {offset} with width {width} exceeds record size {record_size}"
    ))]
    FieldOutOfBounds {
        /// Byte offset within the record.
        offset: usize,
        /// Field width in bytes.
        width: usize,
        /// Record size in bytes.
        record_size: usize,
    },

    /// Field width is not one of 1, 2, 4 or 5 bytes.
    #[snafu(display("Unsupported field width: {width}"))]
    InvalidFieldWidth {
        /// The rejected width.
        width: usize,
    },

    /// Value does not fit into the requested field width.
    #[snafu(display("Value {value} does not fit into {width} bytes"))]
    FieldOverflow {
        /// The value to be written.
        value: u64,
        /// Field width in bytes.
        width: usize,
    },

    /// Inserted byte span is not a whole number of records.
    #[snafu(display("Record span of {len} bytes is not a multiple of {record_size}"))]
    UnalignedRecords {
        /// Length of the supplied span.
        len: usize,
        /// Record size in bytes.
        record_size: usize,
    },

    /// The store has been closed.
    #[snafu(display("Table store is closed"))]
    Closed,

    /// A table with this name is already registered in the pool.
    #[snafu(display("Table {name} is already open"))]
    TableInUse {
        /// Name of the table.
        name: String,
    },

    /// No table with this name is registered in the pool.
    #[snafu(display("Table {name} is not open"))]
    TableNotFound {
        /// Name of the table.
        name: String,
    },
}

impl Error {
    /// Returns `true` for internal-consistency faults: positions outside the
    /// table and corrupted in-memory or on-disk index state, as opposed to
    /// I/O failures.
    pub fn is_consistency_fault(&self) -> bool {
        matches!(
            self,
            Error::PositionOutOfRange { .. } | Error::InvalidAccess { .. } | Error::Corrupted { .. }
        )
    }
}

// Provide automatic conversion from io::Error to Error::Io for ergonomic ? usage
impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::Io { source }
    }
}
