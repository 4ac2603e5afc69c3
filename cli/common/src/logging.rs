//! Logging initialization.

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use crate::LogLevel;

/// Initializes the global subscriber.
///
/// Logs go to stderr so stdout stays clean for program output. `RUST_LOG`
/// overrides `level` when set.
pub fn init_logging(level: LogLevel) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
