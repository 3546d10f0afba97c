//! Tracing setup for worker processes.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging.
///
/// Respects `RUST_LOG`; defaults to `info` for the worker crates and `warn`
/// for everything else. Safe to call once per process.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,docscribe_worker=info,docscribe_core=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
