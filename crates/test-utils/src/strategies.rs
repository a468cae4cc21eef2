//! Proptest strategies for table records and operation sequences.
//!
//! Positions are generated as [`prop::sample::Index`] values and resolved
//! against the table size when the operation is applied, so every generated
//! operation stays valid however earlier ones changed the table.
//!
//! # Usage
//!
//! ```no_run
//! use pretable_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(ops in strategies::arb_ops(8, 50)) {
//!         // apply ops to a table and a model, compare
//!     }
//! }
//! ```

use proptest::{prelude::*, sample::Index};

/// A structural operation against a table.
#[derive(Debug, Clone)]
pub enum TableOp {
    /// Insert `records` at a position in `0..=size`.
    Insert {
        /// Insertion point, resolved against `size + 1`.
        at: Index,
        /// Records to insert, each `record_size` bytes.
        records: Vec<Vec<u8>>,
    },
    /// Delete up to `len` records starting at a position in `0..size`.
    Delete {
        /// First deleted position, resolved against `size`.
        at: Index,
        /// Requested count, clamped to the records behind `at`.
        len: usize,
    },
    /// Overwrite the first four bytes of one record.
    Write {
        /// Target position, resolved against `size`.
        at: Index,
        /// Value to store.
        value: u32,
    },
    /// Flush dirty state to the backend.
    Flush,
}

/// Generates one record of `record_size` random bytes.
pub fn arb_record(record_size: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), record_size)
}

/// Generates 1 to `max` records.
pub fn arb_records(record_size: usize, max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    proptest::collection::vec(arb_record(record_size), 1..=max.max(1))
}

/// Generates a single operation, weighted towards inserts.
pub fn arb_op(record_size: usize) -> impl Strategy<Value = TableOp> {
    prop_oneof![
        4 => (any::<Index>(), arb_records(record_size, 12))
            .prop_map(|(at, records)| TableOp::Insert { at, records }),
        2 => (any::<Index>(), 1usize..10).prop_map(|(at, len)| TableOp::Delete { at, len }),
        2 => (any::<Index>(), any::<u32>()).prop_map(|(at, value)| TableOp::Write { at, value }),
        1 => Just(TableOp::Flush),
    ]
}

/// Generates a sequence of up to `max` operations.
pub fn arb_ops(record_size: usize, max: usize) -> impl Strategy<Value = Vec<TableOp>> {
    proptest::collection::vec(arb_op(record_size), 0..=max)
}
