//! Rhai script stages for stream-processing pipelines.
//!
//! This crate provides two stages that run a user script against every
//! message:
//!
//! - [`ScriptProcessor`]: mutates the message in place and forwards it
//! - [`ScriptOutput`]: terminates the pipeline, and may forward values to
//!   configured sinks with `benthos_output`
//!
//! # Host functions
//!
//! | Function | Arguments | Returns |
//! |---|---|---|
//! | `fetch` | url, headers = "", method = "GET", payload = "" | `#{ status, body }` |
//! | `getMeta` / `setMeta` | key / key, value | value / `()` |
//! | `getRoot` / `setRoot` | - / value | copy of structured payload / `()` |
//! | `getCacheRes` / `setCacheRes` | res, key / res, key, value | value / `()` |
//! | `getCache` / `setCache` | key / key, value | value / `()` |
//! | `benthos_output` | sink, value | `()` |
//!
//! A host function that fails logs the error and returns `()`; it never
//! aborts the script. `console.log`, `console.warn` and `console.error` write
//! to the tracing logger.
//!
//! # Example
//!
//! ```rust,ignore
//! use sb_script::ScriptProcessor;
//! use sb_types::{Message, ScriptConfig};
//!
//! let config = ScriptConfig::with_code(r#"
//!     let doc = getRoot();
//!     doc.seen = true;
//!     setRoot(doc);
//!     setMeta("topic", "processed");
//! "#);
//!
//! let processor = ScriptProcessor::new(&config, resources).await?;
//! let output = processor.process(Message::new(r#"{"id":1}"#)).await?;
//! ```

mod args;
mod bridge;
mod console;
mod conversion;
mod http;
mod output;
mod processor;
mod program;
mod shutdown;
mod stage;

pub use args::{parse_args, ArgSlot};
pub use bridge::MAX_HOST_ARGS;
pub use console::{Console, CONSOLE_TARGET};
pub use conversion::{dynamic_to_json, json_to_dynamic};
pub use http::{parse_header_block, FetchRequest, FetchResponse};
pub use output::{ScriptOutput, OUTPUT_SEND_TIMEOUT};
pub use processor::ScriptProcessor;
pub use program::ScriptProgram;
pub use shutdown::{ShutdownSignal, ShutdownState};
