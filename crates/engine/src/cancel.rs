//! Cooperative cancellation token
//!
//! A clone-shared flag checked by long-running work (rendering, text
//! search). Cancellation is best-effort: the holder observes the flag at
//! its own pace and winds down cleanly.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative abort
///
/// All clones share the same underlying flag, so a token handed to a worker
/// can be cancelled from the controlling thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token. Idempotent; observed by every clone.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Reset to the non-cancelled state (affects every clone)
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}
