//! Error types and classification for the script bridge.
//!
//! This crate provides:
//! - [`BridgeError`] - Top-level error enum for stage construction and execution
//! - Domain-specific errors ([`ScriptError`], [`HostError`], [`ArgError`], [`CacheError`])
//! - [`ErrorCategory`] for deciding whether a failed message is worth retrying

use thiserror::Error;

/// Top-level error type for the script bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Invalid stage configuration (fatal at construction)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Script file could not be read (fatal at construction)
    #[error("I/O error: {0}")]
    Io(String),

    /// Script compilation or execution errors
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Host function errors surfaced outside a script
    #[error("Host function error: {0}")]
    Host(#[from] HostError),

    /// The stage has begun shutting down and accepts no new work
    #[error("Stage is closed")]
    Closed,

    /// The stage was already connected to a transaction source
    #[error("Stage already started")]
    AlreadyStarted,

    /// Generic errors (wrapped anyhow)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Script-related errors.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Script failed to parse
    #[error("failed to compile script: {0}")]
    Compilation(String),

    /// Uncaught runtime fault inside the script
    #[error("script execution failed: {0}")]
    Execution(String),
}

/// Argument marshalling errors raised when converting script call arguments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    /// More arguments supplied than the function declares
    #[error("have {supplied} arguments, but only {expected} to parse into")]
    TooManyArguments { supplied: usize, expected: usize },

    /// An argument was the unit value `()`
    #[error("argument at position {position} is undefined")]
    UndefinedArgument { position: usize },

    /// An argument cannot be converted into the declared shape
    #[error("could not parse argument at position {position} ({found}) into {expected}")]
    UnsupportedType {
        position: usize,
        found: String,
        expected: &'static str,
    },
}

/// Failures of an individual host function call.
///
/// These never abort a script: the bridge logs them and hands `()` back.
#[derive(Error, Debug)]
pub enum HostError {
    /// Argument marshalling failed
    #[error(transparent)]
    Arg(#[from] ArgError),

    /// Metadata key or cache key missing, or cache read failed
    #[error("not found")]
    NotFound,

    /// Cache resource not in the configured allow-list
    #[error("not cache res: {0}")]
    CacheNotPermitted(String),

    /// `getCache`/`setCache` called with no cache resource configured
    #[error("not cache res: no cache resource configured")]
    NoCacheConfigured,

    /// Cache write failed
    #[error("not set")]
    NotSet,

    /// Output resource not in the configured allow-list
    #[error("not output res: {0}")]
    OutputNotPermitted(String),

    /// `benthos_output` called from a processor stage
    #[error("downstream output is only available in the output stage")]
    NotInOutputStage,

    /// Downstream channel did not accept the transaction in time
    #[error("output timeout")]
    DispatchTimeout,

    /// Downstream channel already closed
    #[error("output closed: {0}")]
    OutputClosed(String),

    /// Header block passed to `fetch` is malformed
    #[error("malformed header block: {0}")]
    InvalidHeaders(String),

    /// Outbound HTTP request failed
    #[error("http request failed: {0}")]
    Http(String),

    /// Message payload could not be read or written as structured data
    #[error("payload error: {0}")]
    Payload(String),
}

/// Errors reported by cache backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key does not exist (or has expired)
    #[error("key not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Error classification for retry decisions made by the host pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Might succeed on another attempt
    ///
    /// Examples: HTTP failure surfaced from a script, downstream timeout
    Transient,

    /// Will fail again with the same input
    ///
    /// Examples: compile error, bad configuration, script `throw`
    Permanent,
}

/// Classifies an error to determine retry behavior.
pub fn classify_error(error: &BridgeError) -> ErrorCategory {
    match error {
        BridgeError::Config(_) => ErrorCategory::Permanent,
        BridgeError::Io(_) => ErrorCategory::Permanent,
        BridgeError::Script(_) => ErrorCategory::Permanent,
        BridgeError::Host(e) => classify_host_error(e),
        BridgeError::Closed => ErrorCategory::Transient,
        BridgeError::AlreadyStarted => ErrorCategory::Permanent,
        BridgeError::Other(_) => ErrorCategory::Transient,
    }
}

fn classify_host_error(error: &HostError) -> ErrorCategory {
    match error {
        HostError::Arg(_) => ErrorCategory::Permanent,
        HostError::NotFound => ErrorCategory::Permanent,
        HostError::CacheNotPermitted(_) => ErrorCategory::Permanent,
        HostError::NoCacheConfigured => ErrorCategory::Permanent,
        HostError::NotSet => ErrorCategory::Transient,
        HostError::OutputNotPermitted(_) => ErrorCategory::Permanent,
        HostError::NotInOutputStage => ErrorCategory::Permanent,
        HostError::DispatchTimeout => ErrorCategory::Transient,
        HostError::OutputClosed(_) => ErrorCategory::Transient,
        HostError::InvalidHeaders(_) => ErrorCategory::Permanent,
        HostError::Http(_) => ErrorCategory::Transient,
        HostError::Payload(_) => ErrorCategory::Permanent,
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
