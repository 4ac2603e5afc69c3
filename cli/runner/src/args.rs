//! CLI argument definitions for sb-runner.

use clap::{Parser, ValueEnum};
pub use sb_cli_common::LogLevel;
use std::path::PathBuf;

/// Runs a Rhai script stage over messages read from stdin.
///
/// Each stdin line is one message: either `{"payload": ..., "metadata": {...}}`
/// or any other JSON value used as the payload. Lines that are not JSON are
/// taken as raw payloads.
///
/// ## Examples
///
/// Process messages and print the results:
///   cat events.ndjson | sb-runner -c processor.yaml
///
/// Run an output script that forwards to a sink printing to stdout:
///   cat events.ndjson | sb-runner -c output.yaml -m output --stdout-sink alerts
#[derive(Parser, Debug)]
#[command(name = "sb-runner")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Stage configuration file (YAML)
    #[arg(short = 'c', long, env = "SB_CONFIG")]
    pub config: PathBuf,

    /// Stage variant to run
    #[arg(short = 'm', long, value_enum, default_value = "processor")]
    pub mode: Mode,

    /// Register an in-memory cache resource (repeatable)
    #[arg(long = "memory-cache", value_name = "NAME")]
    pub memory_caches: Vec<String>,

    /// Register a sink resource that prints to stdout (repeatable)
    #[arg(long = "stdout-sink", value_name = "NAME")]
    pub stdout_sinks: Vec<String>,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

/// Stage variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Mutate each message and print it
    Processor,
    /// Run the script as a pipeline output
    Output,
}
