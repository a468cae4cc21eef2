//! Test logging setup.

use tracing_subscriber::{EnvFilter, fmt};

/// Installs a `fmt` subscriber writing through the test harness.
///
/// Honors `RUST_LOG` (default `warn`). Safe to call from every test; only
/// the first call installs the subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}
