//! Bundled resources for script stages.
//!
//! - [`MemoryCache`] - TTL-aware in-memory cache
//! - [`MemorySink`] - Collects delivered messages, mostly for tests
//! - [`StdoutSink`] - Writes delivered messages as JSON lines
//! - [`Resources`] - Name-based registry implementing `ResourceProvider`

mod cache;
mod registry;
mod sink;
mod stdout;

pub use cache::{MemoryCache, DEFAULT_MAX_ENTRIES};
pub use registry::Resources;
pub use sink::MemorySink;
pub use stdout::{message_to_json, StdoutSink};
