use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::types::{RunId, StepSpec};

use super::pool::{Deadline, WorkerPool};
use super::progress::{ProgressSender, ProgressStatus};
use super::results::{ResultStore, StepResult};

/// Performs the actual work of a step.
///
/// Called from several workers at once, so implementations must be safe to
/// share. An `Err` marks the step failed and stops the run once its batch
/// has finished. A step that overruns the run deadline is not interrupted.
#[async_trait::async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &StepSpec, ordinal: usize) -> anyhow::Result<()>;
}

/// Shared state a worker needs to run one step
#[derive(Clone)]
pub(crate) struct Worker {
    pub run_id: RunId,
    pub executor: Arc<dyn StepExecutor>,
    pub pool: WorkerPool,
    pub deadline: Deadline,
    pub results: ResultStore,
    pub progress: ProgressSender,
    pub total_steps: usize,
}

impl Worker {
    /// Run one step under a pool permit and record exactly one result for it.
    ///
    /// Returns whether the step succeeded.
    pub async fn run(&self, step: &StepSpec, ordinal: usize) -> bool {
        let Some(_permit) = self.pool.acquire().await else {
            tracing::debug!(run_id = %self.run_id, ordinal, "Worker pool closed before step started");
            self.results.record(StepResult::cancelled(ordinal)).await;
            return false;
        };

        if self.deadline.is_expired() {
            tracing::debug!(run_id = %self.run_id, ordinal, "Deadline passed, not starting step");
            self.results.record(StepResult::cancelled(ordinal)).await;
            return false;
        }

        let total = Some(self.total_steps);
        self.progress
            .emit(
                ordinal,
                total,
                ProgressStatus::Executing,
                format!("Step {}: {}", ordinal + 1, step.label()),
            )
            .await;

        let started_at = Utc::now();
        let start = std::time::Instant::now();

        let outcome = AssertUnwindSafe(self.executor.execute(step, ordinal))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(_) => Some("step panicked".to_string()),
        };

        let result = StepResult {
            ordinal,
            success: error.is_none(),
            error: error.clone(),
            started_at,
            completed_at: Utc::now(),
            duration: start.elapsed(),
            cancelled: false,
        };
        self.results.record(result).await;

        match error {
            None => {
                tracing::debug!(run_id = %self.run_id, ordinal, "Step completed");
                self.progress
                    .emit(
                        ordinal,
                        total,
                        ProgressStatus::Completed,
                        format!("Step {} completed", ordinal + 1),
                    )
                    .await;
                true
            }
            Some(error) => {
                tracing::warn!(run_id = %self.run_id, ordinal, error = %error, "Step failed");
                self.progress
                    .emit(
                        ordinal,
                        total,
                        ProgressStatus::Failed,
                        format!("Step {} failed: {}", ordinal + 1, error),
                    )
                    .await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::progress::progress_channel;
    use std::time::Duration;

    struct Outcome(Option<&'static str>);

    #[async_trait::async_trait]
    impl StepExecutor for Outcome {
        async fn execute(&self, _step: &StepSpec, _ordinal: usize) -> anyhow::Result<()> {
            match self.0 {
                None => Ok(()),
                Some(msg) => Err(anyhow::anyhow!(msg)),
            }
        }
    }

    struct Panics;

    #[async_trait::async_trait]
    impl StepExecutor for Panics {
        async fn execute(&self, _step: &StepSpec, _ordinal: usize) -> anyhow::Result<()> {
            panic!("boom");
        }
    }

    fn create_test_worker(executor: Arc<dyn StepExecutor>, budget: Duration) -> Worker {
        let results = ResultStore::new();
        let (progress, _monitor) = progress_channel(16, results.clone());
        Worker {
            run_id: RunId::new(),
            executor,
            pool: WorkerPool::new(1),
            deadline: Deadline::new(budget),
            results,
            progress,
            total_steps: 1,
        }
    }

    #[tokio::test]
    async fn test_success_recorded() {
        let worker = create_test_worker(Arc::new(Outcome(None)), Duration::from_secs(60));
        let step = StepSpec::new("dev", "implement");

        assert!(worker.run(&step, 0).await);

        let result = worker.results.get(0).await.unwrap();
        assert!(result.success);
        assert!(result.error.is_none());
        assert!(result.completed_at >= result.started_at);
        assert_eq!(worker.pool.available(), 1);
    }

    #[tokio::test]
    async fn test_error_recorded() {
        let worker = create_test_worker(Arc::new(Outcome(Some("agent crashed"))), Duration::from_secs(60));
        let step = StepSpec::new("dev", "implement");

        assert!(!worker.run(&step, 0).await);

        let result = worker.results.get(0).await.unwrap();
        assert_eq!(result.error.as_deref(), Some("agent crashed"));
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let worker = create_test_worker(Arc::new(Panics), Duration::from_secs(60));
        let step = StepSpec::new("dev", "implement");

        assert!(!worker.run(&step, 0).await);

        let result = worker.results.get(0).await.unwrap();
        assert_eq!(result.error.as_deref(), Some("step panicked"));
        assert_eq!(worker.pool.available(), 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_callback() {
        let worker = create_test_worker(Arc::new(Panics), Duration::from_secs(60));
        worker.deadline.cancel();

        assert!(!worker.run(&StepSpec::new("dev", "implement"), 0).await);
        assert!(worker.results.get(0).await.unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn test_closed_pool_records_cancelled() {
        let worker = create_test_worker(Arc::new(Outcome(None)), Duration::from_secs(60));
        worker.pool.close();

        assert!(!worker.run(&StepSpec::new("dev", "implement"), 0).await);
        assert!(worker.results.get(0).await.unwrap().is_cancelled());
    }
}
