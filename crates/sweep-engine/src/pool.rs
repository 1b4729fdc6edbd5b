//! Fixed-size worker pool for scanning cache roots
//!
//! Workers claim items from a shared, immutable list through an atomic
//! cursor: each `fetch_add` hands out exactly one index, so every item is
//! processed by exactly one worker regardless of pool size. Workers keep a
//! local tally and report it back over a channel when they run out of items;
//! the pool reduces those tallies into a [`PoolReport`].
//!
//! Shutdown is bounded. If the workers have not all reported within the
//! shutdown timeout, the pool stops handing out new indices, logs a warning
//! and returns a report with `drained == false`. Workers still inside a task
//! finish it in the background.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

/// Default time the pool waits for its workers to drain.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Aggregate result of one pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    /// Number of items offered to the pool
    pub items: usize,
    /// Number of items claimed by a worker that reported back
    pub claimed: usize,
    /// Sum of the per-item match counts returned by the task
    pub matched: usize,
    /// Number of workers started
    pub workers: usize,
    /// Whether every worker reported within the shutdown timeout
    pub drained: bool,
}

#[derive(Debug, Default)]
struct WorkerTally {
    claimed: usize,
    matched: usize,
}

/// Pool of OS threads sharing an atomic work cursor.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    shutdown_timeout: Duration,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(1)
    }
}

impl WorkerPool {
    /// Create a pool with `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Apply `predicate` to every item and pass matches to `sink`.
    ///
    /// Sink invocations happen on worker threads in no particular order.
    pub fn run_filter<T, P, S>(&self, items: Vec<T>, predicate: P, sink: S) -> PoolReport
    where
        T: Clone + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        self.run(items, move |item| {
            if predicate(item) {
                sink(item.clone());
                1
            } else {
                0
            }
        })
    }

    /// Run `task` once per item; the task returns how many matches it produced.
    pub fn run<T, F>(&self, items: Vec<T>, task: F) -> PoolReport
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> usize + Send + Sync + 'static,
    {
        let items: Arc<[T]> = items.into();
        let task = Arc::new(task);
        let cursor = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<WorkerTally>();

        let mut handles = Vec::with_capacity(self.size);
        for id in 0..self.size {
            let items = Arc::clone(&items);
            let task = Arc::clone(&task);
            let cursor = Arc::clone(&cursor);
            let closed = Arc::clone(&closed);
            let tx = tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("sweep-worker-{}", id))
                .spawn(move || {
                    let mut tally = WorkerTally::default();
                    while !closed.load(Ordering::Acquire) {
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(item) = items.get(index) else {
                            break;
                        };
                        tally.claimed += 1;
                        tally.matched += task(item);
                    }
                    // The receiver is gone only if the pool already gave up on us.
                    let _ = tx.send(tally);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!(worker = id, error = %e, "failed to start pool worker"),
            }
        }
        drop(tx);

        let mut report = PoolReport {
            items: items.len(),
            workers: handles.len(),
            drained: !handles.is_empty() || items.is_empty(),
            ..PoolReport::default()
        };

        let deadline = Instant::now() + self.shutdown_timeout;
        let mut reported = 0;
        while reported < handles.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(tally) => {
                    reported += 1;
                    report.claimed += tally.claimed;
                    report.matched += tally.matched;
                }
                Err(RecvTimeoutError::Timeout) => {
                    closed.store(true, Ordering::Release);
                    warn!(
                        timeout = ?self.shutdown_timeout,
                        reported,
                        workers = handles.len(),
                        "worker pool did not drain in time, continuing"
                    );
                    report.drained = false;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(
                        reported,
                        workers = handles.len(),
                        "pool worker exited without reporting"
                    );
                    report.drained = false;
                    break;
                }
            }
        }

        if report.drained {
            for handle in handles {
                if handle.join().is_err() {
                    report.drained = false;
                }
            }
        }

        debug!(
            items = report.items,
            claimed = report.claimed,
            matched = report.matched,
            drained = report.drained,
            "worker pool finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_default_pool_has_one_worker() {
        let pool = WorkerPool::default();
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.shutdown_timeout(), DEFAULT_SHUTDOWN_TIMEOUT);
        assert_eq!(WorkerPool::new(0).size(), 1);
    }

    #[test]
    fn test_empty_input() {
        let report = WorkerPool::new(4).run(Vec::<u32>::new(), |_| 1);
        assert_eq!(report.items, 0);
        assert_eq!(report.claimed, 0);
        assert_eq!(report.matched, 0);
        assert!(report.drained);
    }

    #[test]
    fn test_every_item_claimed_exactly_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_workers = Arc::clone(&seen);
        let items: Vec<usize> = (0..1000).collect();

        let report = WorkerPool::new(8).run(items, move |item| {
            seen_by_workers.lock().unwrap().push(*item);
            0
        });

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..1000).collect::<Vec<_>>());
        assert_eq!(report.claimed, 1000);
        assert_eq!(report.workers, 8);
        assert!(report.drained);
    }

    #[test]
    fn test_run_filter_routes_matches_to_sink() {
        let sunk = Arc::new(Mutex::new(Vec::new()));
        let sink_target = Arc::clone(&sunk);

        let report = WorkerPool::new(3).run_filter(
            (0..100).collect::<Vec<u32>>(),
            |n| n % 10 == 0,
            move |n| sink_target.lock().unwrap().push(n),
        );

        let mut sunk = sunk.lock().unwrap().clone();
        sunk.sort_unstable();
        assert_eq!(sunk, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90]);
        assert_eq!(report.matched, 10);
    }

    #[test]
    fn test_match_counts_are_summed_across_workers() {
        let report = WorkerPool::new(4).run((0..50).collect::<Vec<usize>>(), |_| 2);
        assert_eq!(report.matched, 100);
    }

    #[test]
    fn test_timeout_is_not_fatal() {
        let pool = WorkerPool::new(1).with_shutdown_timeout(Duration::from_millis(20));
        let report = pool.run((0..10).collect::<Vec<u32>>(), |_| {
            thread::sleep(Duration::from_millis(100));
            1
        });

        assert!(!report.drained);
        assert!(report.matched < 10);
    }

    #[test]
    fn test_panicking_worker_reported_as_not_drained() {
        let report = WorkerPool::new(1).run(vec![1u32], |_| panic!("scan failed"));
        assert!(!report.drained);
    }
}
