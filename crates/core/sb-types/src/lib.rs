//! Core types for the script bridge.
//!
//! This crate provides the foundational types used throughout the system:
//! - [`Message`] - A payload plus string-keyed metadata, mutated by scripts
//! - [`Transaction`] - A message batch with an acknowledgement channel
//! - [`ScriptConfig`] / [`OutputConfig`] - Stage configuration

pub mod config;
pub mod message;
pub mod transaction;

pub use config::*;
pub use message::*;
pub use transaction::*;
