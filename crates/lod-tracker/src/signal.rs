//! Cancellation tokens for chunk data requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::error::ChunkError;

#[derive(Debug, Default)]
struct Inner {
    aborted: AtomicBool,
    notify: Notify,
}

/// Owning side of an [`AbortSignal`]. Only the holder can cancel.
#[derive(Debug, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Fire the signal. Idempotent.
    pub fn abort(&self) {
        self.signal.inner.aborted.store(true, Ordering::Release);
        self.signal.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }
}

/// Observable cancellation flag shared with a data producer.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<Inner>,
}

impl AbortSignal {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// Resolves once the signal fires.
    pub async fn aborted(&self) {
        let notified = self.inner.notify.notified();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }

    /// `Err(ChunkError::Aborted)` if the signal has fired.
    pub fn check(&self) -> Result<(), ChunkError> {
        if self.is_aborted() {
            Err(ChunkError::Aborted)
        } else {
            Ok(())
        }
    }
}
