//! Log output for test runs

use tracing_subscriber::{fmt, EnvFilter};

/// Install a stdout subscriber at `info` unless `RUST_LOG` says otherwise.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}
