//! Detached background work.

use oxide_core::Result;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Cancellation-aware executor for fire-and-forget tasks.
///
/// Spawned futures run until they finish or [`shutdown`](Self::shutdown)
/// fires the shared token. Their results are only logged.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor whose tasks are cancelled together with `parent`.
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel: parent.child_token(),
        }
    }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(task = name, "Background task cancelled");
                }
                result = task => {
                    if let Err(e) = result {
                        warn!(task = name, error = %e, "Background task failed");
                    }
                }
            }
        });
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait until every task spawned so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel outstanding tasks and wait for them to unwind.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_idle_runs_tasks() {
        let tasks = BackgroundTasks::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            tasks.spawn("count", async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        tasks.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_is_contained() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("fail", async {
            Err(oxide_core::Error::Internal("boom".to_string()))
        });
        tasks.wait_idle().await;
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_work() {
        let tasks = BackgroundTasks::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let flag = finished.clone();
        tasks.spawn("slow", async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        tasks.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parent_token_cancels_children() {
        let parent = CancellationToken::new();
        let tasks = BackgroundTasks::with_parent(&parent);
        tasks.spawn("slow", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        parent.cancel();
        tasks.wait_idle().await;
        assert!(tasks.is_empty());
    }
}
