//! Bounded worker pool with per-task failure recovery
//!
//! Executes a batch of independent tasks with bounded parallelism and
//! drains fully before returning. A failing (or panicking) task is
//! logged and excluded from the result list; it never aborts sibling
//! tasks or the pool. The caller reads `succeeded`/`failed` from the
//! outcome instead of assuming the configured task count, so silent
//! degradation stays observable.
//!
//! Each aggregation run owns its pool instance; parallelism bounds are
//! per-call configuration, not process-global state.

use crate::error::{Result, StabilityError};
use crossbeam::channel::{self, RecvTimeoutError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// One pool task. Errors are recovered per-task; panics are caught.
pub type Task<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

/// Default drain budget: one day. The original pipeline blocked its pool
/// drains for up to a day before declaring the run dead; the duration is
/// a tunable, the fatal-on-expiry behavior is the contract.
pub const DEFAULT_DRAIN_BUDGET: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of draining a task batch.
#[derive(Debug)]
pub struct PoolOutcome<T> {
    /// Successful results, in completion order (not submission order).
    pub results: Vec<T>,
    /// Number of tasks that completed successfully.
    pub succeeded: usize,
    /// Number of tasks that failed or panicked.
    pub failed: usize,
    /// Number of tasks skipped or discarded due to cancellation.
    pub skipped: usize,
}

enum TaskMessage<T> {
    Done(T),
    Failed(String),
    Skipped,
}

/// Bounded worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    drain_budget: Duration,
}

impl WorkerPool {
    /// Create a pool. `max_parallelism <= 0` means "use all available
    /// parallelism units".
    pub fn new(max_parallelism: i32) -> Self {
        let workers = if max_parallelism <= 0 {
            thread::available_parallelism().map_or(1, usize::from)
        } else {
            max_parallelism as usize
        };
        Self {
            workers,
            drain_budget: DEFAULT_DRAIN_BUDGET,
        }
    }

    pub fn with_drain_budget(mut self, budget: Duration) -> Self {
        self.drain_budget = budget;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run all tasks to completion and collect the survivors.
    pub fn run<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Result<PoolOutcome<T>> {
        self.run_cancellable(tasks, Arc::new(AtomicBool::new(false)))
    }

    /// Run with cooperative cancellation: once `cancel` is set, no new
    /// task starts; tasks already running finish, but their results are
    /// discarded.
    pub fn run_cancellable<T: Send + 'static>(
        &self,
        tasks: Vec<Task<T>>,
        cancel: Arc<AtomicBool>,
    ) -> Result<PoolOutcome<T>> {
        let submitted = tasks.len();

        if submitted == 0 {
            return Ok(PoolOutcome {
                results: Vec::new(),
                succeeded: 0,
                failed: 0,
                skipped: 0,
            });
        }

        let (task_tx, task_rx) = channel::unbounded::<(usize, Task<T>)>();
        let (result_tx, result_rx) = channel::unbounded::<TaskMessage<T>>();

        for (k, task) in tasks.into_iter().enumerate() {
            task_tx.send((k, task)).expect("task channel open");
        }
        drop(task_tx);

        let workers = self.workers.min(submitted);

        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let cancel = Arc::clone(&cancel);

            thread::spawn(move || {
                while let Ok((k, task)) = task_rx.recv() {
                    if cancel.load(Ordering::Relaxed) {
                        let _ = result_tx.send(TaskMessage::Skipped);
                        continue;
                    }

                    let message = match panic::catch_unwind(AssertUnwindSafe(task)) {
                        Ok(Ok(value)) => TaskMessage::Done(value),
                        Ok(Err(e)) => {
                            warn!(task = k, error = %e, "task failed; excluding from aggregation");
                            TaskMessage::Failed(e.to_string())
                        }
                        Err(_) => {
                            warn!(task = k, "task panicked; excluding from aggregation");
                            TaskMessage::Failed("task panicked".to_string())
                        }
                    };

                    // Receiver may have given up (drain timeout); nothing
                    // left to do with the result in that case.
                    if result_tx.send(message).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        self.drain(result_rx, submitted, &cancel)
    }

    fn drain<T>(
        &self,
        result_rx: channel::Receiver<TaskMessage<T>>,
        submitted: usize,
        cancel: &AtomicBool,
    ) -> Result<PoolOutcome<T>> {
        let deadline = Instant::now() + self.drain_budget;
        let mut results = Vec::new();
        let mut failed = 0usize;
        let mut skipped = 0usize;
        let mut received = 0usize;

        while received < submitted {
            let remaining = deadline.saturating_duration_since(Instant::now());

            match result_rx.recv_timeout(remaining) {
                Ok(message) => {
                    received += 1;
                    match message {
                        // A result arriving after cancellation was
                        // requested belongs to an in-flight task; it is
                        // discarded, not aggregated.
                        TaskMessage::Done(_) if cancel.load(Ordering::Relaxed) => skipped += 1,
                        TaskMessage::Done(value) => results.push(value),
                        TaskMessage::Failed(_) => failed += 1,
                        TaskMessage::Skipped => skipped += 1,
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(StabilityError::PoolTimeout {
                        waited_secs: self.drain_budget.as_secs(),
                    });
                }
            }
        }

        let succeeded = results.len();
        Ok(PoolOutcome {
            results,
            succeeded,
            failed,
            skipped,
        })
    }
}
