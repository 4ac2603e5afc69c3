//! Transactions: message batches paired with an acknowledgement channel.

use crate::message::MessageBatch;
use tokio::sync::oneshot;

/// Outcome reported back to the producer of a transaction.
pub type AckResult = Result<(), String>;

/// A unit of delivery: a batch plus an optional acknowledgement channel.
///
/// The consumer must call [`ack`](Transaction::ack) exactly once when it has
/// finished with the batch. Dropping a transaction without acking resolves the
/// producer's receiver with a closed-channel error.
#[derive(Debug)]
pub struct Transaction {
    batch: MessageBatch,
    ack: Option<oneshot::Sender<AckResult>>,
}

impl Transaction {
    /// Creates a transaction nobody waits on.
    pub fn new(batch: MessageBatch) -> Self {
        Self { batch, ack: None }
    }

    /// Creates a transaction and returns the receiver for its acknowledgement.
    pub fn with_ack(batch: MessageBatch) -> (Self, oneshot::Receiver<AckResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                batch,
                ack: Some(tx),
            },
            rx,
        )
    }

    /// Returns the messages in this transaction.
    pub fn batch(&self) -> &MessageBatch {
        &self.batch
    }

    /// Takes the batch out, leaving the acknowledgement in place.
    pub fn take_batch(&mut self) -> MessageBatch {
        std::mem::take(&mut self.batch)
    }

    /// Returns true if a producer is waiting on the acknowledgement.
    pub fn expects_ack(&self) -> bool {
        self.ack.is_some()
    }

    /// Acknowledges the transaction, consuming it.
    pub fn ack(mut self, result: AckResult) {
        if let Some(tx) = self.ack.take() {
            // The producer may have stopped waiting
            let _ = tx.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    #[tokio::test]
    async fn test_ack_reaches_producer() {
        let (tx, rx) = Transaction::with_ack(vec![Message::new("a")]);
        assert!(tx.expects_ack());
        assert_eq!(tx.batch().len(), 1);

        tx.ack(Ok(()));
        assert_eq!(rx.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_dropped_transaction_closes_ack() {
        let (tx, rx) = Transaction::with_ack(vec![Message::new("a")]);
        drop(tx);
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_ack_without_receiver_is_noop() {
        let mut tx = Transaction::new(vec![Message::new("a"), Message::new("b")]);
        assert!(!tx.expects_ack());
        assert_eq!(tx.take_batch().len(), 2);
        assert!(tx.batch().is_empty());
        tx.ack(Err("ignored".to_string()));
    }
}
