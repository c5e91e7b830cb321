use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Events emitted while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    BatchStarted { items: usize },
    ThrottleWaited { duration: Duration },
    ItemStarted { index: usize },
    /// `rows` is the number of output rows; `0` for failed items.
    ItemFinished { index: usize, rows: usize, success: bool },
    BatchFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Logs execution events to stderr.
#[derive(Debug, Default)]
pub struct StdErrExecutionObserver;

impl ExecutionObserver for StdErrExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::BatchFinished { metrics, .. } => eprintln!("[rowpad][batch] {metrics}"),
            ExecutionEvent::ItemFinished {
                index,
                success: false,
                ..
            } => eprintln!("[rowpad][batch] item {index} failed"),
            _ => {}
        }
    }
}

/// Live counters for the current batch; callers can snapshot them at any time.
#[derive(Debug, Default)]
pub struct ExecutionMetrics {
    batch_id: AtomicU64,
    elapsed_ns: AtomicU64,

    items_processed: AtomicU64,
    items_failed: AtomicU64,
    rows_produced: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_items: AtomicUsize,
    max_active_items: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin_batch(&self) {
        let _ = self.batch_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.items_processed.store(0, Ordering::SeqCst);
        self.items_failed.store(0, Ordering::SeqCst);
        self.rows_produced.store(0, Ordering::SeqCst);
        self.throttle_wait_ns.store(0, Ordering::SeqCst);
        self.active_items.store(0, Ordering::SeqCst);
        self.max_active_items.store(0, Ordering::SeqCst);
    }

    pub(crate) fn end_batch(&self, elapsed: Duration) {
        self.elapsed_ns.store(saturating_nanos(elapsed), Ordering::SeqCst);
    }

    pub(crate) fn on_item_start(&self) {
        let now = self.active_items.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_items, now);
    }

    pub(crate) fn on_item_end(&self, rows: usize, success: bool) {
        let _ = self.items_processed.fetch_add(1, Ordering::SeqCst);
        if !success {
            let _ = self.items_failed.fetch_add(1, Ordering::SeqCst);
        }
        let _ = self.rows_produced.fetch_add(rows as u64, Ordering::SeqCst);
        let _ = self.active_items.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn on_throttle_wait(&self, d: Duration) {
        let _ = self.throttle_wait_ns.fetch_add(saturating_nanos(d), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        ExecutionMetricsSnapshot {
            batch_id: self.batch_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            items_processed: self.items_processed.load(Ordering::SeqCst),
            items_failed: self.items_failed.load(Ordering::SeqCst),
            rows_produced: self.rows_produced.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_items: self.max_active_items.load(Ordering::SeqCst),
        }
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    let _ = dst.fetch_max(now, Ordering::SeqCst);
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub batch_id: u64,
    /// `None` while the batch is still running.
    pub elapsed: Option<Duration>,
    pub items_processed: u64,
    pub items_failed: u64,
    pub rows_produced: u64,
    pub throttle_wait: Duration,
    pub max_active_items: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch_id={}, items={} (failed={}), rows={}, max_active_items={}, throttle_wait={:?}, elapsed={:?}",
            self.batch_id,
            self.items_processed,
            self.items_failed,
            self.rows_produced,
            self.max_active_items,
            self.throttle_wait,
            self.elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ExecutionMetrics;

    #[test]
    fn begin_batch_resets_counters() {
        let m = ExecutionMetrics::new();
        m.begin_batch();
        m.on_item_start();
        m.on_item_start();
        m.on_item_end(3, true);
        m.on_item_end(0, false);
        m.on_throttle_wait(Duration::from_millis(1));
        m.end_batch(Duration::from_millis(5));

        let snap = m.snapshot();
        assert_eq!(snap.batch_id, 1);
        assert_eq!(snap.items_processed, 2);
        assert_eq!(snap.items_failed, 1);
        assert_eq!(snap.rows_produced, 3);
        assert_eq!(snap.max_active_items, 2);
        assert_eq!(snap.elapsed, Some(Duration::from_millis(5)));

        m.begin_batch();
        let snap = m.snapshot();
        assert_eq!(snap.batch_id, 2);
        assert_eq!(snap.items_processed, 0);
        assert_eq!(snap.elapsed, None);
        assert!(snap.to_string().starts_with("batch_id=2"));
    }
}
