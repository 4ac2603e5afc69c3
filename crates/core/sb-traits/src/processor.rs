//! Processor trait for per-message stages.

use async_trait::async_trait;
use sb_error::Result;
use sb_types::{Message, MessageBatch};

/// Trait for message processors.
///
/// A processor takes one message and returns zero or more messages to
/// forward. Returning an error means the input is not forwarded; retry
/// policy belongs to the host pipeline.
///
/// # Thread Safety
///
/// Processors must be `Send + Sync` as they may be used across tasks.
/// Internal state (like script engines) should use appropriate synchronization.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Processes a single message.
    async fn process(&self, message: Message) -> Result<Vec<Message>>;

    /// Processes every message of a batch in order.
    ///
    /// Stops at the first failing message and returns its error.
    async fn process_batch(&self, batch: MessageBatch) -> Result<MessageBatch> {
        let mut output = Vec::with_capacity(batch.len());
        for message in batch {
            output.extend(self.process(message).await?);
        }
        Ok(output)
    }

    /// Releases any resources held by the processor.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Returns the name of this processor for logging.
    fn name(&self) -> &str {
        "processor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_error::{BridgeError, ScriptError};

    /// Tags each message and fails on payload "bad".
    struct TagProcessor;

    #[async_trait]
    impl Processor for TagProcessor {
        async fn process(&self, mut message: Message) -> Result<Vec<Message>> {
            if &message.as_bytes()[..] == b"bad" {
                return Err(ScriptError::Execution("bad payload".to_string()).into());
            }
            message.meta_set("tagged", "yes");
            Ok(vec![message])
        }
    }

    #[tokio::test]
    async fn test_default_batch_processing() {
        let batch = vec![Message::new("a"), Message::new("b")];
        let result = TagProcessor.process_batch(batch).await.unwrap();

        assert_eq!(result.len(), 2);
        assert!(result
            .iter()
            .all(|m| m.meta_get_str("tagged").as_deref() == Some("yes")));
        assert_eq!(TagProcessor.name(), "processor");
    }

    #[tokio::test]
    async fn test_batch_stops_at_first_error() {
        let batch = vec![Message::new("a"), Message::new("bad"), Message::new("c")];
        let result = TagProcessor.process_batch(batch).await;

        assert!(matches!(result, Err(BridgeError::Script(_))));
    }
}
