//! Script output stage.
//!
//! The output variant runs the script against every message it receives and
//! lets the script forward values to configured sinks via `benthos_output`.
//! It owns those sinks: each one is fed through its own channel and closed
//! when the stage closes.

use crate::shutdown::ShutdownSignal;
use crate::stage::ScriptStage;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use sb_error::{BridgeError, HostError, Result};
use sb_traits::{ResourceProvider, Sink};
use sb_types::{Message, MessageBatch, OutputConfig, Transaction};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, trace, warn};

/// How long `benthos_output` waits for a sink to accept a transaction.
pub const OUTPUT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll interval while waiting for downstream acknowledgements on close.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-sink senders and the count of unacknowledged downstream transactions.
pub(crate) struct OutputChannels {
    names: Vec<String>,
    senders: Mutex<Option<Vec<mpsc::Sender<Transaction>>>>,
    pending_acks: AtomicUsize,
    acked: Notify,
}

impl OutputChannels {
    fn new(names: Vec<String>, senders: Vec<mpsc::Sender<Transaction>>) -> Self {
        Self {
            names,
            senders: Mutex::new(Some(senders)),
            pending_acks: AtomicUsize::new(0),
            acked: Notify::new(),
        }
    }

    /// Sends `payload` to the sink `name` as a single-message transaction.
    ///
    /// Blocks the calling thread for at most [`OUTPUT_SEND_TIMEOUT`]. Must not
    /// be called from within an async task.
    pub(crate) fn dispatch(
        self: &Arc<Self>,
        runtime: &Handle,
        name: &str,
        payload: String,
    ) -> std::result::Result<(), HostError> {
        let index = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| HostError::OutputNotPermitted(name.to_string()))?;

        let sender = self
            .senders
            .lock()
            .as_ref()
            .and_then(|senders| senders.get(index).cloned())
            .ok_or_else(|| HostError::OutputClosed(name.to_string()))?;

        let (transaction, ack) = Transaction::with_ack(vec![Message::new(payload)]);
        let sent = runtime.block_on(async {
            tokio::time::timeout(OUTPUT_SEND_TIMEOUT, sender.send(transaction)).await
        });
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(HostError::OutputClosed(name.to_string())),
            Err(_) => return Err(HostError::DispatchTimeout),
        }

        self.pending_acks.fetch_add(1, Ordering::SeqCst);
        trace!(sink = %name, "Dispatched transaction downstream");

        let channels = Arc::clone(self);
        let sink = name.to_string();
        runtime.spawn(async move {
            match ack.await {
                Ok(Ok(())) => trace!(sink = %sink, "Downstream transaction acknowledged"),
                Ok(Err(e)) => warn!(sink = %sink, error = %e, "Downstream transaction rejected"),
                Err(_) => debug!(sink = %sink, "Downstream transaction dropped without ack"),
            }
            channels.pending_acks.fetch_sub(1, Ordering::SeqCst);
            channels.acked.notify_waiters();
        });

        Ok(())
    }

    fn pending_acks(&self) -> usize {
        self.pending_acks.load(Ordering::SeqCst)
    }

    /// Drops every sender so the sinks see their channels close.
    fn close_channels(&self) {
        self.senders.lock().take();
    }
}

/// Script stage that terminates a pipeline, optionally forwarding to sinks.
///
/// Feed it either directly with [`write_batch`](Self::write_batch) or by
/// handing it a transaction channel through [`Sink::consume`].
pub struct ScriptOutput {
    inner: Arc<OutputInner>,
}

struct OutputInner {
    name: String,
    stage: Arc<ScriptStage>,
    channels: Arc<OutputChannels>,
    sinks: Vec<Arc<dyn Sink>>,
    shutdown: ShutdownSignal,
    started: AtomicBool,
    sink_close_timeout: Duration,
    runtime: Handle,
}

impl std::fmt::Debug for ScriptOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptOutput")
            .field("name", &self.inner.name)
            .field("script", &self.inner.stage.program().name())
            .field("output_res", &self.inner.channels.names)
            .finish_non_exhaustive()
    }
}

impl ScriptOutput {
    /// Builds the output stage and starts every configured sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be loaded or compiled, or an
    /// output resource is not registered with `resources`.
    pub async fn new(config: &OutputConfig, resources: Arc<dyn ResourceProvider>) -> Result<Self> {
        let stage = ScriptStage::new(&config.script, Arc::clone(&resources)).await?;

        let mut sinks = Vec::with_capacity(config.output_res.len());
        for name in &config.output_res {
            let sink = resources.sink(name).ok_or_else(|| {
                BridgeError::Config(format!("output resource '{name}' is not registered"))
            })?;
            sinks.push(sink);
        }

        let mut senders = Vec::with_capacity(sinks.len());
        for sink in &sinks {
            let (tx, rx) = mpsc::channel(1);
            sink.consume(rx)?;
            senders.push(tx);
        }

        info!(
            script = %stage.program().name(),
            output_res = ?config.output_res,
            "Created script output"
        );

        Ok(Self {
            inner: Arc::new(OutputInner {
                name: "script_output".to_string(),
                stage: Arc::new(stage),
                channels: Arc::new(OutputChannels::new(config.output_res.clone(), senders)),
                sinks,
                shutdown: ShutdownSignal::new(),
                started: AtomicBool::new(false),
                sink_close_timeout: config.shutdown_timeout(),
                runtime: Handle::current(),
            }),
        })
    }

    /// Runs the script against every message of `batch`.
    ///
    /// All messages are attempted and the first failure is returned. Once
    /// closing begins the remaining messages are rejected with
    /// [`BridgeError::Closed`].
    pub async fn write_batch(&self, batch: MessageBatch) -> Result<()> {
        self.inner.write(batch).await
    }

    /// Requests a cooperative close: pending downstream acknowledgements are
    /// awaited before the sinks are closed.
    pub fn close_at_leisure(&self) {
        self.inner.shutdown.close_at_leisure();
        self.inner.start_closing_if_idle();
    }

    /// Returns the stage's shutdown signal.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.inner.shutdown
    }

    /// Number of downstream transactions not yet acknowledged.
    pub fn pending_acks(&self) -> usize {
        self.inner.channels.pending_acks()
    }
}

#[async_trait]
impl Sink for ScriptOutput {
    fn consume(&self, transactions: mpsc::Receiver<Transaction>) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::AlreadyStarted);
        }

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(inner.run(transactions));
        Ok(())
    }

    fn trigger_close_now(&self) {
        self.inner.shutdown.close_now();
        self.inner.start_closing_if_idle();
    }

    async fn wait_for_close(&self) -> Result<()> {
        self.inner.shutdown.closed().await;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl OutputInner {
    async fn write(&self, batch: MessageBatch) -> Result<()> {
        if self.shutdown.should_close_at_leisure() {
            return Err(BridgeError::Closed);
        }

        let mut first_error = None;
        for (index, message) in batch.into_iter().enumerate() {
            let guard = self.stage.lock_executions().await;
            // Closing may have begun while this message waited for the lock.
            if self.shutdown.should_close_at_leisure() {
                debug!(index = index, "Output closing, rejecting remaining messages");
                first_error.get_or_insert(BridgeError::Closed);
                break;
            }

            if let Err(e) = self
                .stage
                .execute_locked(guard, message, Some(Arc::clone(&self.channels)))
                .await
            {
                warn!(index = index, error = %e, "Script failed for message");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Receives upstream transactions until the channel closes or a close is
    /// requested, then shuts the stage down.
    async fn run(self: Arc<Self>, mut transactions: mpsc::Receiver<Transaction>) {
        debug!("Script output consuming transactions");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.close_at_leisure_requested() => break,

                received = transactions.recv() => match received {
                    Some(mut transaction) => {
                        let batch = transaction.take_batch();
                        let result = self.write(batch).await;
                        transaction.ack(result.map_err(|e| e.to_string()));
                    }
                    None => {
                        debug!("Upstream transaction channel closed");
                        self.shutdown.close_at_leisure();
                        break;
                    }
                },
            }
        }

        self.close().await;
    }

    /// Closes directly when no consume loop is running to do it.
    fn start_closing_if_idle(self: &Arc<Self>) {
        if !self.started.swap(true, Ordering::SeqCst) {
            let inner = Arc::clone(self);
            self.runtime.spawn(async move { inner.close().await });
        }
    }

    async fn close(&self) {
        // Held until the end so no script runs against closed channels.
        let _guard = tokio::select! {
            biased;

            guard = self.stage.lock_executions() => Some(guard),
            _ = self.shutdown.close_now_requested() => {
                warn!("Closing while a script is still running");
                None
            }
        };

        self.drain_pending_acks().await;

        self.channels.close_channels();
        for sink in &self.sinks {
            sink.trigger_close_now();
        }

        let timeout = self.sink_close_timeout;
        let results = join_all(
            self.sinks
                .iter()
                .map(|sink| tokio::time::timeout(timeout, sink.wait_for_close())),
        )
        .await;
        for (sink, result) in self.sinks.iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(sink = sink.name(), error = %e, "Sink failed to close"),
                Err(_) => warn!(
                    sink = sink.name(),
                    timeout_secs = timeout.as_secs(),
                    "Timed out waiting for sink to close"
                ),
            }
        }

        self.shutdown.shutdown_complete();
        info!("Script output closed");
    }

    /// Waits until every downstream transaction has been acknowledged.
    ///
    /// Gives up as soon as an immediate close is requested.
    async fn drain_pending_acks(&self) {
        loop {
            let pending = self.channels.pending_acks();
            if pending == 0 {
                return;
            }
            trace!(pending = pending, "Waiting for downstream acknowledgements");

            tokio::select! {
                _ = self.shutdown.close_now_requested() => {
                    warn!(pending = pending, "Closing with unacknowledged downstream transactions");
                    return;
                }
                _ = self.channels.acked.notified() => {}
                _ = tokio::time::sleep(ACK_POLL_INTERVAL) => {}
            }
        }
    }
}
