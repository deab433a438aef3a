//! Bounded worker pool with per-task deadlines.
//!
//! Tasks run on tokio tasks gated by a semaphore of `max_workers` permits.
//! A deadline covers both waiting for a permit and running. When it passes,
//! the caller gets [`ExecutorError::TimedOut`] right away while the task keeps
//! running (and keeps its permit) until it finishes on its own. Such tasks
//! are counted as abandoned, and [`BoundedExecutor::shutdown`] waits for them.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("worker pool is shut down")]
    ShutDown,

    #[error("task panicked: {0}")]
    Panicked(String),
}

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// Fixed-size pool for tool invocations.
pub struct BoundedExecutor {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    abandoned: Arc<AtomicUsize>,
    max_workers: usize,
}

impl BoundedExecutor {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            tracker: TaskTracker::new(),
            abandoned: Arc::new(AtomicUsize::new(0)),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Tasks whose caller timed out but which are still running.
    pub fn abandoned_count(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Tasks currently tracked by the pool, abandoned ones included.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Run `task`, waiting at most `deadline` for its output.
    ///
    /// With no deadline the task runs inline on the caller, but still waits
    /// for a permit so `max_workers` bounds it too.
    pub async fn run<F, T>(&self, task: F, deadline: Option<Duration>) -> Result<T, ExecutorError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shut_down() {
            return Err(ExecutorError::ShutDown);
        }

        let Some(deadline) = deadline else {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| ExecutorError::ShutDown)?;
            return AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|payload| ExecutorError::Panicked(panic_message(payload)));
        };

        let permits = self.permits.clone();
        let abandoned = self.abandoned.clone();
        let status = Arc::new(AtomicU8::new(RUNNING));
        let task_status = status.clone();

        let mut handle = self.tracker.spawn(async move {
            let output = match permits.acquire_owned().await {
                Ok(_permit) => Ok(task.await),
                Err(_) => Err(ExecutorError::ShutDown),
            };
            if task_status.swap(FINISHED, Ordering::SeqCst) == ABANDONED {
                abandoned.fetch_sub(1, Ordering::SeqCst);
                tracing::debug!("Abandoned tool task finished");
            }
            output
        });

        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(Ok(output)) => output,
            Ok(Err(join_err)) => Err(ExecutorError::Panicked(join_err.to_string())),
            Err(_) => {
                // Count first so the task's decrement can never run ahead of it.
                self.abandoned.fetch_add(1, Ordering::SeqCst);
                if status
                    .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    self.abandoned.fetch_sub(1, Ordering::SeqCst);
                } else {
                    tracing::warn!(
                        "Tool task exceeded {:.2}s deadline; leaving it to finish in the background",
                        deadline.as_secs_f64()
                    );
                }
                Err(ExecutorError::TimedOut(deadline))
            }
        }
    }

    /// Stop accepting work and wait for every in-flight task to finish.
    ///
    /// Tasks still waiting for a permit fail with [`ExecutorError::ShutDown`]
    /// instead of starting.
    pub async fn shutdown(&self) {
        self.permits.close();
        self.tracker.close();
        tracing::info!(
            "Shutting down tool worker pool ({} in flight, {} abandoned)",
            self.tracker.len(),
            self.abandoned_count()
        );
        self.tracker.wait().await;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Instant};

    #[tokio::test(start_paused = true)]
    async fn returns_output_before_deadline() {
        let executor = BoundedExecutor::new(2);
        let out = executor
            .run(async { 41 + 1 }, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_promptly_and_task_keeps_running() {
        let executor = BoundedExecutor::new(1);
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();
        let start = Instant::now();

        let result = executor
            .run(
                async move {
                    sleep(Duration::from_secs(10)).await;
                    flag.fetch_add(1, Ordering::SeqCst);
                },
                Some(Duration::from_secs(1)),
            )
            .await;

        assert!(matches!(result, Err(ExecutorError::TimedOut(d)) if d == Duration::from_secs(1)));
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(executor.abandoned_count(), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(executor.abandoned_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_bounds_concurrency() {
        let executor = Arc::new(BoundedExecutor::new(2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let runs = (0..4).map(|_| {
            let executor = executor.clone();
            let active = active.clone();
            let peak = peak.clone();
            async move {
                executor
                    .run(
                        async move {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            sleep(Duration::from_secs(1)).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                        },
                        Some(Duration::from_secs(10)),
                    )
                    .await
            }
        });
        let results = futures::future::join_all(runs).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn inline_runs_share_the_worker_bound() {
        let executor = Arc::new(BoundedExecutor::new(1));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let runs = (0..4).map(|_| {
            let executor = executor.clone();
            let active = active.clone();
            let peak = peak.clone();
            async move {
                executor
                    .run(
                        async move {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            sleep(Duration::from_secs(1)).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                        },
                        None,
                    )
                    .await
            }
        });
        let results = futures::future::join_all(runs).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_work_is_refused_once_shut_down() {
        let executor = Arc::new(BoundedExecutor::new(1));
        let started = Arc::new(AtomicUsize::new(0));

        let busy = {
            let executor = executor.clone();
            let started = started.clone();
            tokio::spawn(async move {
                executor
                    .run(
                        async move {
                            started.fetch_add(1, Ordering::SeqCst);
                            sleep(Duration::from_secs(2)).await;
                        },
                        Some(Duration::from_secs(10)),
                    )
                    .await
            })
        };
        let queued = {
            let executor = executor.clone();
            let started = started.clone();
            tokio::spawn(async move {
                executor
                    .run(
                        async move {
                            started.fetch_add(1, Ordering::SeqCst);
                        },
                        Some(Duration::from_secs(10)),
                    )
                    .await
            })
        };
        sleep(Duration::from_millis(100)).await;

        executor.shutdown().await;

        assert!(busy.await.unwrap().is_ok());
        assert!(matches!(queued.await.unwrap(), Err(ExecutorError::ShutDown)));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn work_spawned_after_permits_close_never_starts() {
        let executor = BoundedExecutor::new(1);
        let started = Arc::new(AtomicUsize::new(0));
        let flag = started.clone();

        // a run that slipped past the shut-down check while shutdown was closing the pool
        executor.permits.close();
        let late = executor
            .run(
                async move {
                    flag.fetch_add(1, Ordering::SeqCst);
                },
                Some(Duration::from_secs(1)),
            )
            .await;

        assert!(matches!(late, Err(ExecutorError::ShutDown)));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_deadline_runs_inline() {
        let executor = BoundedExecutor::new(1);
        let out = executor.run(async { "inline" }, None).await.unwrap();
        assert_eq!(out, "inline");
        assert_eq!(executor.in_flight(), 0);
    }

    #[tokio::test]
    async fn panics_are_reported_not_propagated() {
        let executor = BoundedExecutor::new(1);
        let pooled = executor
            .run(async { panic!("boom") }, Some(Duration::from_secs(5)))
            .await;
        assert!(matches!(pooled, Err(ExecutorError::Panicked(_))));

        let inline: Result<(), _> = executor.run(async { panic!("inline boom") }, None).await;
        match inline {
            Err(ExecutorError::Panicked(msg)) => assert_eq!(msg, "inline boom"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_abandoned_work_and_refuses_new_work() {
        let executor = BoundedExecutor::new(1);
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();
        let _ = executor
            .run(
                async move {
                    sleep(Duration::from_secs(5)).await;
                    flag.fetch_add(1, Ordering::SeqCst);
                },
                Some(Duration::from_millis(100)),
            )
            .await;

        executor.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(executor.is_shut_down());

        let refused = executor.run(async {}, Some(Duration::from_secs(1))).await;
        assert!(matches!(refused, Err(ExecutorError::ShutDown)));
        let refused_inline = executor.run(async {}, None).await;
        assert!(matches!(refused_inline, Err(ExecutorError::ShutDown)));
    }
}
