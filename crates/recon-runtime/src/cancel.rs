//! Cooperative cancellation (§5: "Actions receive a cancellation token; they
//! must check it at suspension points. After cancellation the tracked scope
//! reverts state changes.").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A shared, cloneable cancellation flag. `stop()` calls `trigger()`; a fork
/// propagates the same token into every branch so cancelling the fork
/// cancels each running action.
#[derive(Clone)]
pub struct CancellationToken {
    notify: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { notify: Arc::new(Notify::new()), cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Marks this token cancelled and wakes anyone awaiting [`cancelled`].
    pub fn trigger(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resets the token for reuse across a subsequent `seek`.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Resolves once [`trigger`] is called, for actions that need to race
    /// cancellation against their own suspension point.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}
