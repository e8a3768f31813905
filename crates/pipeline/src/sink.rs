//! Fire-and-forget trace persistence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relia_core::{Trace, TraceStore};
use tokio::sync::Notify;

/// Schedules trace writes without blocking the response path, while keeping
/// enough bookkeeping to drain pending writes at shutdown.
#[derive(Clone)]
pub struct TraceSink {
    store: Arc<dyn TraceStore>,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl TraceSink {
    pub fn new(store: Arc<dyn TraceStore>) -> Self {
        Self {
            store,
            pending: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Schedule a trace write. Returns immediately.
    pub fn save(&self, trace: Trace) {
        let store = self.store.clone();
        let pending = self.pending.clone();
        let drained = self.drained.clone();

        pending.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            if let Err(e) = store.save_trace(&trace).await {
                tracing::warn!(error = %e, trace_id = %trace.trace_id, "trace write failed");
            }
            if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                drained.notify_waiters();
            }
        });
    }

    /// Best-effort drain of pending writes, bounded by `timeout`.
    pub async fn drain(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pending.load(Ordering::SeqCst) > 0 {
            let wait = self.drained.notified();
            if tokio::time::timeout_at(deadline, wait).await.is_err() {
                tracing::warn!(
                    pending = self.pending.load(Ordering::SeqCst),
                    "trace drain timed out"
                );
                return;
            }
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}
