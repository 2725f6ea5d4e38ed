//! Cancellation context threaded through every pipeline stage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation flag shared between a placement cycle and whoever
/// may abort it. Stages check it at their boundaries; a cancelled
/// cycle requeues its unit instead of binding.
#[derive(Debug, Clone, Default)]
pub struct CycleContext {
    cancelled: Arc<AtomicBool>,
}

impl CycleContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
