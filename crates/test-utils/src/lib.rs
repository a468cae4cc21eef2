//! Shared test utilities for the pretable crates.
//!
//! - [`TestDir`] - Managed temporary directory with table path helpers
//! - [`init_tracing`] - Route `tracing` output through the test harness
//! - [`strategies`] - Proptest generators for records and table operations

#![deny(unsafe_code)]

mod test_dir;
pub use test_dir::TestDir;

mod tracing_init;
pub use tracing_init::init_tracing;

pub mod strategies;
