//! Two-tier shutdown signalling for the output stage.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a stage. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShutdownState {
    Running = 0,
    Closing = 1,
    Closed = 2,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::Closing,
            _ => ShutdownState::Closed,
        }
    }
}

/// Shared shutdown signal.
///
/// `close_at_leisure` asks the stage to drain and stop; `close_now` asks it
/// to stop waiting on anything. Both are idempotent and clones observe the
/// same signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

#[derive(Debug)]
struct SignalInner {
    state: AtomicU8,
    close_at_leisure: CancellationToken,
    close_now: CancellationToken,
    closed: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                state: AtomicU8::new(ShutdownState::Running as u8),
                close_at_leisure: CancellationToken::new(),
                close_now: CancellationToken::new(),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Requests a cooperative close.
    pub fn close_at_leisure(&self) {
        self.advance(ShutdownState::Closing);
        self.inner.close_at_leisure.cancel();
    }

    /// Requests an immediate close. Implies `close_at_leisure`.
    pub fn close_now(&self) {
        self.close_at_leisure();
        self.inner.close_now.cancel();
    }

    pub fn should_close_at_leisure(&self) -> bool {
        self.inner.close_at_leisure.is_cancelled()
    }

    pub fn should_close_now(&self) -> bool {
        self.inner.close_now.is_cancelled()
    }

    /// Resolves once a cooperative (or immediate) close was requested.
    pub async fn close_at_leisure_requested(&self) {
        self.inner.close_at_leisure.cancelled().await;
    }

    /// Resolves once an immediate close was requested.
    pub async fn close_now_requested(&self) {
        self.inner.close_now.cancelled().await;
    }

    /// Marks the stage fully closed.
    pub fn shutdown_complete(&self) {
        self.advance(ShutdownState::Closed);
        self.inner.closed.cancel();
    }

    pub fn has_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once the stage is fully closed.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    fn advance(&self, to: ShutdownState) {
        self.inner.state.fetch_max(to as u8, Ordering::SeqCst);
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
