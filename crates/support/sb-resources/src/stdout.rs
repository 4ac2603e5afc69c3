//! Stdout sink.

use crate::sink::SinkLifecycle;
use async_trait::async_trait;
use sb_error::Result;
use sb_traits::Sink;
use sb_types::{Message, Transaction};
use serde_json::{json, Value};
use std::io::{self, Write};
use tokio::sync::mpsc;

/// Renders a message as a JSON object with `payload` and `metadata` fields.
///
/// Payloads that parse as JSON are embedded as values, anything else as a
/// (lossily decoded) string.
pub fn message_to_json(message: &Message) -> Value {
    let payload = match message.as_structured() {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(&message.as_bytes()).into_owned()),
    };
    json!({
        "payload": payload,
        "metadata": message.metadata(),
    })
}

/// Sink that writes every delivered message to stdout as a JSON line.
///
/// Used for debugging and pipeline verification.
#[derive(Debug)]
pub struct StdoutSink {
    name: String,
    lifecycle: SinkLifecycle,
}

impl StdoutSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lifecycle: SinkLifecycle::default(),
        }
    }
}

#[async_trait]
impl Sink for StdoutSink {
    fn consume(&self, transactions: mpsc::Receiver<Transaction>) -> Result<()> {
        let name = self.name.clone();
        self.lifecycle
            .start(self.name.clone(), transactions, true, move |batch| {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                for message in &batch {
                    let mut line = message_to_json(message);
                    line["sink"] = Value::String(name.clone());
                    writeln!(handle, "{line}")
                        .map_err(|e| format!("Failed to write to stdout: {e}"))?;
                }
                handle
                    .flush()
                    .map_err(|e| format!("Failed to flush stdout: {e}"))
            })
    }

    fn trigger_close_now(&self) {
        self.lifecycle.trigger_close_now();
    }

    async fn wait_for_close(&self) -> Result<()> {
        self.lifecycle.wait_for_close().await;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
