//! Fan-out sink for terminal call errors
//!
//! Constructed once at process start and injected into every client, rather
//! than living as a hidden global. Listeners receive every error that exits
//! `request()` as a terminal failure, exactly once per failure.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::error::ClientError;

type ErrorCallback = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Handle returned by [`ErrorReporter::on_error`], used to deregister
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Shared error sink. Cheap to clone; clones fan out to the same listeners.
#[derive(Clone)]
pub struct ErrorReporter {
    inner: Arc<ReporterInner>,
}

struct ReporterInner {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(u64, ErrorCallback)>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                next_id: AtomicU64::new(1),
                callbacks: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register a listener for terminal errors.
    ///
    /// Returns a subscription handle; dropping the handle does nothing, call
    /// [`unsubscribe`](Self::unsubscribe) to stop receiving errors.
    pub fn on_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.write().push((id, Arc::new(callback)));
        SubscriptionId(id)
    }

    /// Remove a previously registered listener. Returns false when the
    /// subscription was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.inner.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(cb_id, _)| *cb_id != id.0);
        callbacks.len() != before
    }

    /// Log the error and notify every listener.
    ///
    /// A panicking listener is caught and logged; it affects neither the
    /// remaining listeners nor the caller.
    pub fn report(&self, err: &ClientError) {
        error!(error = %err, "outbound call failed terminally");

        // Snapshot outside the lock so a listener may (un)subscribe freely.
        let callbacks: Vec<(u64, ErrorCallback)> = self.inner.callbacks.read().clone();
        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(err))).is_err() {
                error!(subscription = id, "error listener panicked");
            }
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.callbacks.read().len()
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn transport_error() -> ClientError {
        ClientError::Transport {
            message: "connection refused".to_string(),
            source: None,
        }
    }

    #[test]
    fn listeners_receive_each_report_once() {
        let reporter = ErrorReporter::new();
        let seen = Arc::new(AtomicU32::new(0));
        let s = seen.clone();
        reporter.on_error(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        reporter.report(&transport_error());
        reporter.report(&transport_error());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let reporter = ErrorReporter::new();
        let seen = Arc::new(AtomicU32::new(0));
        let s = seen.clone();
        let id = reporter.on_error(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        reporter.report(&transport_error());
        assert!(reporter.unsubscribe(id));
        reporter.report(&transport_error());

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(reporter.listener_count(), 0);
        assert!(!reporter.unsubscribe(id));
    }

    #[test]
    fn panicking_listener_does_not_affect_others() {
        let reporter = ErrorReporter::new();
        let seen = Arc::new(AtomicU32::new(0));

        reporter.on_error(|_| panic!("listener bug"));
        let s = seen.clone();
        reporter.on_error(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        reporter.report(&transport_error());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clones_share_listeners() {
        let reporter = ErrorReporter::new();
        let clone = reporter.clone();
        let seen = Arc::new(AtomicU32::new(0));
        let s = seen.clone();
        reporter.on_error(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        clone.report(&transport_error());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
