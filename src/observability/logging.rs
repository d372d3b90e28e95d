//! Structured logging initialization.

use tracing_subscriber::EnvFilter;

/// Initializes a global `tracing` subscriber writing to stderr.
///
/// The filter comes from `ENGRAM_LOG` (falling back to `RUST_LOG`, then to
/// `engram=info`). Calling this twice is harmless: the second call is a
/// no-op because a global subscriber is already installed.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("ENGRAM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("engram=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
