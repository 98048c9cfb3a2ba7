//! Bounded pool for synchronous user code.
//!
//! Synchronous handlers, producers, and resource releases run through this
//! executor so they never block the cooperative scheduler. The pool is
//! bounded by a semaphore; waiting for a permit respects the caller's
//! cancellation. A submission that already entered the blocking pool runs
//! to completion even if the caller goes away.

use std::sync::Arc;
use tokio::sync::Semaphore;

/// A bounded executor for blocking closures.
///
/// # Example
///
/// ```rust
/// use daedalus_core::SyncExecutor;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let executor = SyncExecutor::new(4);
/// let value = executor.run(|| 40 + 2).await.unwrap();
/// assert_eq!(value, 42);
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct SyncExecutor {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl SyncExecutor {
    /// Creates an executor with the given number of concurrent workers.
    ///
    /// A worker count of zero is clamped to one.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Returns the configured worker bound.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs a blocking closure on the pool, waiting for a free worker.
    ///
    /// # Errors
    ///
    /// Returns an error when the pool is shut down or the closure panics.
    pub async fn run<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("sync executor is closed"))?;
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| anyhow::anyhow!("sync task failed: {e}"))?;
        Ok(result)
    }
}

impl Default for SyncExecutor {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_value() {
        let executor = SyncExecutor::new(2);
        let result = executor.run(|| "done").await.unwrap();
        assert_eq!(result, "done");
    }

    #[tokio::test]
    async fn test_bound_is_respected() {
        let executor = SyncExecutor::new(1);
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let executor = executor.clone();
            let peak = Arc::clone(&peak);
            let active = Arc::clone(&active);
            tasks.push(tokio::spawn(async move {
                executor
                    .run(move || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(10));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let executor = SyncExecutor::new(1);
        let result = executor.run(|| panic!("boom")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_workers_clamped() {
        assert_eq!(SyncExecutor::new(0).workers(), 1);
    }
}
