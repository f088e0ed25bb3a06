//! Cooperative cancellation shared across an entire run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One source per run, cloned into every runner level and worker. Cancellation
/// is monotonic: once requested it stays requested for the rest of the run.
#[derive(Clone, Debug, Default)]
pub struct CancellationTokenSource {
    cancelled: Arc<AtomicBool>,
}

impl CancellationTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
