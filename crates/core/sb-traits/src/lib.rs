//! Collaborator traits for the script bridge.
//!
//! This crate defines the interfaces a stage consumes from its host:
//! - [`Cache`] - Named key-value cache resources
//! - [`Sink`] - Downstream destinations fed through a transaction channel
//! - [`ResourceProvider`] - Lookup of caches and sinks by resource name
//! - [`Processor`] - Per-message processing stage

pub mod cache;
pub mod processor;
pub mod resources;
pub mod sink;

pub use cache::Cache;
pub use processor::Processor;
pub use resources::ResourceProvider;
pub use sink::Sink;
