//! Cancellation handles.
//!
//! Every transaction carries a [`CancelHandle`]. The handle is polled
//! before each store or iterator operation; once tripped, the operation
//! fails with `Cancelled` and the owning transaction becomes
//! rollback-only. Timeouts are a deadline attached to the same handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct CancelInner {
    tripped: AtomicBool,
    deadline: Option<Instant>,
}

/// Cloneable token shared between the caller and in-flight work.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

impl CancelHandle {
    /// A handle that never trips on its own.
    pub fn new() -> CancelHandle {
        CancelHandle::default()
    }

    /// A handle that trips once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> CancelHandle {
        CancelHandle {
            inner: Arc::new(CancelInner {
                tripped: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
            }),
        }
    }

    /// Trip the handle. Idempotent.
    pub fn trip(&self) {
        self.inner.tripped.store(true, Ordering::Release);
    }

    pub fn is_tripped(&self) -> bool {
        if self.inner.tripped.load(Ordering::Acquire) {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trip() {
        let h = CancelHandle::new();
        assert!(!h.is_tripped());
        let h2 = h.clone();
        h2.trip();
        assert!(h.is_tripped());
    }

    #[test]
    fn test_deadline() {
        let h = CancelHandle::with_timeout(Duration::from_secs(3600));
        assert!(!h.is_tripped());
        let h = CancelHandle::with_timeout(Duration::ZERO);
        assert!(h.is_tripped());
    }
}
