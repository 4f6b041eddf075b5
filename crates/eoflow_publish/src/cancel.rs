use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::PublishError;

/// Cooperative cancellation for uploads.
///
/// Clones share state. The binary trips it from Ctrl-C; the uploader checks
/// it before every part.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), PublishError> {
        if self.is_cancelled() {
            Err(PublishError::Cancelled)
        } else {
            Ok(())
        }
    }
}
