//! Per-request deadline and cancellation.
//!
//! Every long-running stage re-checks the deadline; the raster section
//! additionally checks for cancellation between operations (individual
//! engine ops are not interruptible).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::ProxyError;

/// Cooperative cancellation flag, shared between the HTTP layer and the
/// processing task.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves when (or immediately after) the token is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Deadline plus cancellation, checked between pipeline stages.
#[derive(Clone)]
pub struct RequestContext {
    pub deadline: Instant,
    pub cancel: CancelToken,
}

impl RequestContext {
    pub fn new(deadline: Instant, cancel: CancelToken) -> Self {
        Self { deadline, cancel }
    }

    /// Error out if the request was cancelled or the deadline passed.
    pub fn check(&self) -> Result<(), ProxyError> {
        if self.cancel.is_cancelled() {
            return Err(ProxyError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(ProxyError::Timeout);
        }
        Ok(())
    }
}
