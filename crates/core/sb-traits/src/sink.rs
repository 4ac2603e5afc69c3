//! Downstream sink trait.

use async_trait::async_trait;
use sb_error::Result;
use sb_types::Transaction;
use tokio::sync::mpsc;

/// Trait for downstream destinations.
///
/// # Lifecycle
///
/// 1. [`consume`](Sink::consume) hands the sink the receiving end of its
///    transaction channel; the sink reads until the channel closes
/// 2. Each transaction is acknowledged once the sink has written its batch
/// 3. [`trigger_close_now`](Sink::trigger_close_now) asks the sink to stop
///    without waiting for further transactions
/// 4. [`wait_for_close`](Sink::wait_for_close) resolves once the sink has
///    released everything it owns
#[async_trait]
pub trait Sink: Send + Sync {
    /// Starts consuming transactions. May only be called once.
    fn consume(&self, transactions: mpsc::Receiver<Transaction>) -> Result<()>;

    /// Signals the sink to shut down immediately.
    fn trigger_close_now(&self);

    /// Waits until the sink has fully closed.
    ///
    /// Callers bound this with their own timeout.
    async fn wait_for_close(&self) -> Result<()>;

    /// Returns the name of this sink for logging.
    fn name(&self) -> &str {
        "sink"
    }
}
