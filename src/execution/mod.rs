//! Batch execution of independent flatten and chart-query calls.
//!
//! Each document or query is evaluated on its own table, so a batch parallelizes across items
//! with no shared state. This module provides:
//!
//! - a dedicated rayon pool (`num_threads`)
//! - an in-flight limit on concurrently evaluated items (`max_in_flight`)
//! - live metrics and observer hooks for monitoring
//!
//! Results are returned in input order.

mod observer;
mod semaphore;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde_json::Value as JsonValue;

use crate::error::{RowpadError, RowpadResult};
use crate::flatten::{flatten_document, PipelineOptions};
use crate::query::{ChartQuery, QueryExecutor, QueryResult};
use crate::types::Table;

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, StdErrExecutionObserver,
};

use semaphore::Semaphore;

/// Configuration for the [`BatchExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Number of worker threads.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Upper bound on items evaluated at the same time, on top of `num_threads`.
    pub max_in_flight: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = available_threads();
        Self {
            num_threads: Some(n),
            max_in_flight: n,
        }
    }
}

fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Runs many flatten or query calls in parallel with shared [`PipelineOptions`].
pub struct BatchExecutor {
    pool: ThreadPool,
    opts: ExecutionOptions,
    queries: QueryExecutor,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl BatchExecutor {
    /// Create an executor.
    ///
    /// Fails with a config error if `max_in_flight == 0`, `num_threads == Some(0)`, or the
    /// thread pool cannot be built.
    pub fn new(opts: ExecutionOptions, pipeline: PipelineOptions) -> RowpadResult<Self> {
        if opts.max_in_flight == 0 {
            return Err(RowpadError::config("max_in_flight must be > 0"));
        }
        if opts.num_threads == Some(0) {
            return Err(RowpadError::config("num_threads must be > 0 when set"));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(opts.num_threads.unwrap_or_else(available_threads))
            .build()
            .map_err(|e| RowpadError::config(format!("failed to build thread pool: {e}")))?;

        Ok(Self {
            pool,
            opts,
            queries: QueryExecutor::new(pipeline),
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    /// Attach an observer for execution events.
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Handle to live metrics of the current (or last) batch.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.opts
    }

    /// Flatten every document. A failure only affects its own slot.
    pub fn flatten_batch(&self, documents: &[JsonValue]) -> Vec<RowpadResult<Table>> {
        let pipeline = self.queries.options();
        self.run_batch(
            documents,
            |doc| flatten_document(doc, pipeline),
            |out| match out {
                Ok(table) => (table.height(), true),
                Err(_) => (0, false),
            },
        )
    }

    /// Execute every query; failures are reported in the corresponding [`QueryResult`].
    pub fn query_batch(&self, queries: &[ChartQuery]) -> Vec<QueryResult> {
        self.run_batch(
            queries,
            |q| self.queries.execute(q),
            |r| (r.data.len(), r.success),
        )
    }

    fn run_batch<T, R, F, O>(&self, items: &[T], work: F, outcome: O) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
        O: Fn(&R) -> (usize, bool) + Sync,
    {
        let start = Instant::now();
        self.metrics.begin_batch();
        self.emit(ExecutionEvent::BatchStarted { items: items.len() });

        let sem = Semaphore::new(self.opts.max_in_flight);
        let out: Vec<R> = self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| {
                    let (_permit, waited) = sem.acquire();
                    if waited > Duration::ZERO {
                        self.metrics.on_throttle_wait(waited);
                        self.emit(ExecutionEvent::ThrottleWaited { duration: waited });
                    }

                    self.metrics.on_item_start();
                    self.emit(ExecutionEvent::ItemStarted { index });

                    let result = work(item);
                    let (rows, success) = outcome(&result);

                    self.emit(ExecutionEvent::ItemFinished { index, rows, success });
                    self.metrics.on_item_end(rows, success);
                    result
                })
                .collect()
        });

        self.metrics.end_batch(start.elapsed());
        self.emit(ExecutionEvent::BatchFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });
        out
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::{BatchExecutor, ExecutionEvent, ExecutionObserver, ExecutionOptions};
    use crate::flatten::PipelineOptions;
    use crate::query::ChartQuery;

    struct ConcurrencyObserver {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl ConcurrencyObserver {
        fn new() -> Self {
            Self {
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }
    }

    impl ExecutionObserver for ConcurrencyObserver {
        fn on_event(&self, event: &ExecutionEvent) {
            match event {
                ExecutionEvent::ItemStarted { .. } => {
                    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_active.fetch_max(now, Ordering::SeqCst);
                    // Hold the item long enough to overlap if not throttled.
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                ExecutionEvent::ItemFinished { .. } => {
                    let _ = self.active.fetch_sub(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn rejects_zero_limits() {
        let err = BatchExecutor::new(
            ExecutionOptions {
                num_threads: Some(2),
                max_in_flight: 0,
            },
            PipelineOptions::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn flatten_batch_preserves_input_order() {
        let exec = BatchExecutor::new(ExecutionOptions::default(), PipelineOptions::default()).unwrap();
        let docs: Vec<_> = (0..50).map(|i| json!({"id": i, "tags": vec!["t"; i % 4]})).collect();
        let out = exec.flatten_batch(&docs);
        assert_eq!(out.len(), 50);
        for (i, table) in out.iter().enumerate() {
            let table = table.as_ref().unwrap();
            assert_eq!(table.height(), (i % 4).max(1));
            assert_eq!(table.value(0, "id"), Some(&crate::types::Value::Int64(i as i64)));
        }
        let snap = exec.metrics().snapshot();
        assert_eq!(snap.items_processed, 50);
        assert_eq!(snap.items_failed, 0);
    }

    #[test]
    fn max_in_flight_throttles_items() {
        let observer = Arc::new(ConcurrencyObserver::new());
        let obs_trait: Arc<dyn ExecutionObserver> = observer.clone();
        let exec = BatchExecutor::new(
            ExecutionOptions {
                num_threads: Some(4),
                max_in_flight: 1,
            },
            PipelineOptions::default(),
        )
        .unwrap()
        .with_observer(obs_trait);

        let queries: Vec<ChartQuery> = (0..20)
            .map(|i| ChartQuery {
                data: json!({"v": i}),
                ..Default::default()
            })
            .collect();
        let out = exec.query_batch(&queries);

        assert!(out.iter().all(|r| r.success));
        assert_eq!(observer.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(exec.metrics().snapshot().max_active_items, 1);
    }
}
