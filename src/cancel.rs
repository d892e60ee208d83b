//! Cooperative cancellation between coarse pipeline stages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{FilterError, Result};

/// Shared flag a running filter polls between stages.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `Err(Cancelled)` once `cancel` has been called on any clone.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(FilterError::Cancelled)
        } else {
            Ok(())
        }
    }
}
