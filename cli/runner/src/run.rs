//! Main execution logic for sb-runner.

use anyhow::{Context, Result};
use sb_error::{classify_error, BridgeError, ErrorCategory};
use sb_resources::{message_to_json, MemoryCache, Resources, StdoutSink};
use sb_script::{ScriptOutput, ScriptProcessor};
use sb_traits::{Processor, ResourceProvider, Sink};
use sb_types::{Message, OutputConfig, ScriptConfig};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::args::{Cli, Mode};

/// Extra time allowed on top of the sink grace period before forcing close.
const CLOSE_MARGIN: Duration = Duration::from_secs(1);

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub messages_read: u64,
    pub messages_processed: u64,
    pub messages_failed: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub transient_errors: u64,
    pub permanent_errors: u64,
    pub elapsed: Duration,
}

impl RunStats {
    fn record_failure(&mut self, error: &BridgeError) {
        self.messages_failed += 1;
        match classify_error(error) {
            ErrorCategory::Transient => self.transient_errors += 1,
            ErrorCategory::Permanent => self.permanent_errors += 1,
        }
    }
}

/// Execute the runner with the provided arguments.
pub async fn execute(args: Cli) -> Result<RunStats> {
    let raw = tokio::fs::read_to_string(&args.config)
        .await
        .with_context(|| format!("failed to read config {}", args.config.display()))?;
    let resources: Arc<dyn ResourceProvider> = Arc::new(build_resources(&args));

    match args.mode {
        Mode::Processor => {
            let config = parse_config::<ScriptConfig>(&raw, &args.config)?;
            run_processor(&config, resources).await
        }
        Mode::Output => {
            let config = parse_config::<OutputConfig>(&raw, &args.config)?;
            run_output(&config, resources).await
        }
    }
}

fn parse_config<T: serde::de::DeserializeOwned>(raw: &str, path: &Path) -> Result<T> {
    serde_yaml::from_str(raw).with_context(|| format!("invalid config {}", path.display()))
}

fn build_resources(args: &Cli) -> Resources {
    let mut resources = Resources::new();
    for name in &args.memory_caches {
        resources = resources.with_cache(name.as_str(), MemoryCache::new());
    }
    for name in &args.stdout_sinks {
        resources = resources.with_sink(name.as_str(), StdoutSink::new(name.as_str()));
    }
    debug!(resources = ?resources, "Registered resources");
    resources
}

async fn run_processor(config: &ScriptConfig, resources: Arc<dyn ResourceProvider>) -> Result<RunStats> {
    let processor = ScriptProcessor::new(config, resources).await?;
    info!(script = %processor.program().name(), "Running script processor");

    let start = Instant::now();
    let mut stats = RunStats::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        stats.messages_read += 1;
        stats.bytes_read += line.len() as u64;

        match processor.process(parse_message(&line)).await {
            Ok(messages) => {
                stats.messages_processed += 1;
                for message in &messages {
                    let out = format!("{}\n", message_to_json(message));
                    stdout
                        .write_all(out.as_bytes())
                        .await
                        .context("failed to write stdout")?;
                    stats.bytes_written += out.len() as u64;
                }
            }
            Err(e) => stats.record_failure(&e),
        }
    }

    stdout.flush().await.context("failed to flush stdout")?;
    processor.close().await?;
    stats.elapsed = start.elapsed();
    Ok(stats)
}

async fn run_output(config: &OutputConfig, resources: Arc<dyn ResourceProvider>) -> Result<RunStats> {
    let output = ScriptOutput::new(config, resources).await?;
    info!(output_res = ?config.output_res, "Running script output");

    let start = Instant::now();
    let mut stats = RunStats::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        stats.messages_read += 1;
        stats.bytes_read += line.len() as u64;

        match output.write_batch(vec![parse_message(&line)]).await {
            Ok(()) => stats.messages_processed += 1,
            Err(e) => stats.record_failure(&e),
        }
    }

    output.close_at_leisure();
    let grace = config.shutdown_timeout() + CLOSE_MARGIN;
    if tokio::time::timeout(grace, output.wait_for_close()).await.is_err() {
        warn!(
            pending_acks = output.pending_acks(),
            "Output did not close in time, forcing shutdown"
        );
        output.trigger_close_now();
        tokio::time::timeout(grace, output.wait_for_close())
            .await
            .context("output failed to close")??;
    }

    stats.elapsed = start.elapsed();
    Ok(stats)
}

/// Builds a message from one input line.
///
/// A JSON object with a `payload` key is an envelope: string payloads are
/// used as raw bytes, other values as structured payloads, and `metadata`
/// entries are copied over. Any other JSON value is the structured payload.
/// Non-JSON lines are raw payloads.
pub fn parse_message(line: &str) -> Message {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => return Message::new(line.to_string()),
    };

    match value {
        Value::Object(mut envelope) if envelope.contains_key("payload") => {
            let mut message = match envelope.remove("payload") {
                Some(Value::String(raw)) => Message::new(raw),
                Some(structured) => Message::from_structured(structured),
                None => Message::empty(),
            };
            if let Some(Value::Object(metadata)) = envelope.remove("metadata") {
                for (key, value) in metadata {
                    message.meta_set(key, value);
                }
            }
            message
        }
        other => Message::from_structured(other),
    }
}
