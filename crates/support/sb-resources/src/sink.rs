//! In-memory sink and the consume loop shared by the bundled sinks.

use async_trait::async_trait;
use parking_lot::Mutex;
use sb_error::{BridgeError, Result};
use sb_traits::Sink;
use sb_types::{AckResult, Message, MessageBatch, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Start/close bookkeeping for a sink driven by a transaction channel.
#[derive(Debug, Default)]
pub(crate) struct SinkLifecycle {
    started: AtomicBool,
    close_now: CancellationToken,
    closed: CancellationToken,
}

impl SinkLifecycle {
    /// Spawns the consume loop. `write` is called for each batch and its
    /// result acknowledges the transaction. With `read == false` the loop
    /// never reads from the channel and only waits to be closed.
    pub(crate) fn start<F>(
        &self,
        name: String,
        mut transactions: mpsc::Receiver<Transaction>,
        read: bool,
        mut write: F,
    ) -> Result<()>
    where
        F: FnMut(MessageBatch) -> AckResult + Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::AlreadyStarted);
        }

        let close_now = self.close_now.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = close_now.cancelled() => break,

                    received = transactions.recv(), if read => match received {
                        Some(mut transaction) => {
                            let result = write(transaction.take_batch());
                            transaction.ack(result);
                        }
                        None => break,
                    },
                }
            }
            debug!(sink = %name, "Sink closed");
            closed.cancel();
        });

        Ok(())
    }

    pub(crate) fn trigger_close_now(&self) {
        self.close_now.cancel();
        if !self.started.load(Ordering::SeqCst) {
            self.closed.cancel();
        }
    }

    pub(crate) async fn wait_for_close(&self) {
        self.closed.cancelled().await;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Sink that keeps every delivered message in memory.
///
/// Cloning yields another handle to the same sink, so a test can keep one
/// handle while the stage owns the other.
#[derive(Debug, Clone)]
pub struct MemorySink {
    inner: Arc<MemorySinkInner>,
}

#[derive(Debug)]
struct MemorySinkInner {
    name: String,
    reads: bool,
    messages: Mutex<Vec<Message>>,
    received: Notify,
    lifecycle: SinkLifecycle,
}

impl MemorySink {
    /// Creates a sink that accepts and acknowledges every transaction.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), true)
    }

    /// Creates a sink that never reads its channel, so senders block once
    /// the channel is full. It still honours close requests.
    pub fn stalled(name: impl Into<String>) -> Self {
        Self::build(name.into(), false)
    }

    fn build(name: String, reads: bool) -> Self {
        Self {
            inner: Arc::new(MemorySinkInner {
                name,
                reads,
                messages: Mutex::new(Vec::new()),
                received: Notify::new(),
                lifecycle: SinkLifecycle::default(),
            }),
        }
    }

    /// Snapshot of every message delivered so far.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.messages.lock().clone()
    }

    /// Waits until at least `count` messages arrived or `timeout` elapsed,
    /// then returns what was delivered.
    pub async fn wait_for_messages(&self, count: usize, timeout: Duration) -> Vec<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.received.notified();
            {
                let messages = self.inner.messages.lock();
                if messages.len() >= count {
                    return messages.clone();
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.messages();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn consume(&self, transactions: mpsc::Receiver<Transaction>) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        self.inner.lifecycle.start(
            self.inner.name.clone(),
            transactions,
            self.inner.reads,
            move |batch| {
                inner.messages.lock().extend(batch);
                inner.received.notify_waiters();
                Ok(())
            },
        )
    }

    fn trigger_close_now(&self) {
        self.inner.lifecycle.trigger_close_now();
    }

    async fn wait_for_close(&self) -> Result<()> {
        self.inner.lifecycle.wait_for_close().await;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_and_acks() {
        let sink = MemorySink::new("mem");
        let (tx, rx) = mpsc::channel(1);
        sink.consume(rx).unwrap();

        let (transaction, ack) = Transaction::with_ack(vec![Message::new("a")]);
        tx.send(transaction).await.unwrap();

        assert_eq!(ack.await.unwrap(), Ok(()));
        assert_eq!(sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_closes_when_channel_closes() {
        let sink = MemorySink::new("mem");
        let (tx, rx) = mpsc::channel(1);
        sink.consume(rx).unwrap();

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), sink.wait_for_close())
            .await
            .unwrap()
            .unwrap();
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_consume_twice_fails() {
        let sink = MemorySink::new("mem");
        let (_tx1, rx1) = mpsc::channel(1);
        let (_tx2, rx2) = mpsc::channel(1);

        sink.consume(rx1).unwrap();
        assert!(matches!(sink.consume(rx2), Err(BridgeError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_stalled_sink_blocks_senders_until_closed() {
        let sink = MemorySink::stalled("slow");
        let (tx, rx) = mpsc::channel(1);
        sink.consume(rx).unwrap();

        tx.send(Transaction::new(vec![Message::new("fills buffer")]))
            .await
            .unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            tx.send(Transaction::new(vec![Message::new("blocked")])),
        )
        .await;
        assert!(blocked.is_err());

        sink.trigger_close_now();
        tokio::time::timeout(Duration::from_secs(1), sink.wait_for_close())
            .await
            .unwrap()
            .unwrap();
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_close_before_consume() {
        let sink = MemorySink::new("idle");
        sink.trigger_close_now();
        assert!(sink.is_closed());
    }
}
