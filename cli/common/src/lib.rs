//! Shared utilities for the script bridge CLI binaries.

pub mod args;
pub mod format;
pub mod logging;

pub use args::LogLevel;
pub use format::{format_bytes, format_number, format_rate};
pub use logging::init_logging;
