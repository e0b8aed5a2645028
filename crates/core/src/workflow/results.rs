use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Outcome of one step. Written once by the worker that ran it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub ordinal: usize,
    pub success: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration: Duration,
    /// Never started because the run deadline had already fired
    #[serde(default)]
    pub cancelled: bool,
}

impl StepResult {
    /// Result recorded for a step that was never started because the
    /// deadline had already fired
    pub fn cancelled(ordinal: usize) -> Self {
        let now = Utc::now();
        Self {
            ordinal,
            success: false,
            error: Some("execution cancelled".to_string()),
            started_at: now,
            completed_at: now,
            duration: Duration::ZERO,
            cancelled: true,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Thread-safe map from step ordinal to its result.
///
/// The lock is only held for a single read or write, never across a step
/// callback.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    results: Arc<RwLock<HashMap<usize, StepResult>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a result. The first write for an ordinal wins; a second write
    /// is dropped and reported as `false`.
    pub async fn record(&self, result: StepResult) -> bool {
        let mut results = self.results.write().await;
        if results.contains_key(&result.ordinal) {
            tracing::warn!(
                ordinal = result.ordinal,
                "Ignoring duplicate result for step"
            );
            return false;
        }
        results.insert(result.ordinal, result);
        true
    }

    pub async fn get(&self, ordinal: usize) -> Option<StepResult> {
        self.results.read().await.get(&ordinal).cloned()
    }

    pub async fn contains(&self, ordinal: usize) -> bool {
        self.results.read().await.contains_key(&ordinal)
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }

    /// Copy of every recorded result; changing it never touches the store
    pub async fn snapshot(&self) -> HashMap<usize, StepResult> {
        self.results.read().await.clone()
    }

    /// First failed result among `ordinals`, lowest ordinal first
    pub async fn first_failure(&self, ordinals: &[usize]) -> Option<StepResult> {
        let results = self.results.read().await;
        let mut sorted = ordinals.to_vec();
        sorted.sort_unstable();
        sorted
            .into_iter()
            .filter_map(|ordinal| results.get(&ordinal))
            .find(|result| !result.success)
            .cloned()
    }

    pub async fn summary(&self) -> ExecutionSummary {
        ExecutionSummary::from_results(self.results.read().await.values())
    }
}

/// Aggregate statistics over recorded step results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub fastest: Duration,
    pub slowest: Duration,
    /// Worker slots the run was allowed; 0 when unknown
    #[serde(default)]
    pub concurrency: usize,
}

impl ExecutionSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a StepResult>) -> Self {
        let mut summary = Self::default();
        let mut fastest: Option<Duration> = None;

        for result in results {
            summary.total += 1;
            if result.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }

            summary.total_duration += result.duration;
            fastest = Some(fastest.map_or(result.duration, |f| f.min(result.duration)));
            summary.slowest = summary.slowest.max(result.duration);
        }

        summary.fastest = fastest.unwrap_or_default();
        if summary.total > 0 {
            summary.average_duration = summary.total_duration / summary.total as u32;
        }

        summary
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Fraction of recorded steps that succeeded, in `[0, 1]`
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64
    }
}

impl std::fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Success rate: {}/{} ({:.1}%)",
            self.succeeded,
            self.total,
            self.success_rate() * 100.0
        )?;
        writeln!(f, "Total duration: {:?}", self.total_duration)?;
        writeln!(f, "Average duration: {:?}", self.average_duration)?;
        writeln!(f, "Fastest step: {:?}", self.fastest)?;
        write!(f, "Slowest step: {:?}", self.slowest)?;
        if self.concurrency > 0 {
            write!(f, "\nConcurrency used: {}", self.concurrency)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_result(ordinal: usize, success: bool, millis: u64) -> StepResult {
        let now = Utc::now();
        StepResult {
            ordinal,
            success,
            error: (!success).then(|| "test error".to_string()),
            started_at: now,
            completed_at: now,
            duration: Duration::from_millis(millis),
            cancelled: false,
        }
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let store = ResultStore::new();

        assert!(store.record(create_test_result(0, true, 1000)).await);

        let results = store.snapshot().await;
        assert_eq!(results.len(), 1);
        assert!(results[&0].success);
        assert_eq!(results[&0].duration, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_first_write_wins() {
        let store = ResultStore::new();

        assert!(store.record(create_test_result(3, true, 10)).await);
        assert!(!store.record(create_test_result(3, false, 20)).await);

        let stored = store.get(3).await.unwrap();
        assert!(stored.success);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let store = ResultStore::new();
        store.record(create_test_result(0, true, 5)).await;

        let mut copy = store.snapshot().await;
        copy.remove(&0);
        copy.insert(9, create_test_result(9, false, 1));

        assert_eq!(store.len().await, 1);
        assert!(store.contains(0).await);
        assert!(!store.contains(9).await);
    }

    #[tokio::test]
    async fn test_first_failure_is_lowest_ordinal() {
        let store = ResultStore::new();
        store.record(create_test_result(0, true, 5)).await;
        store.record(create_test_result(2, false, 5)).await;
        store.record(create_test_result(1, false, 5)).await;

        let failure = store.first_failure(&[2, 0, 1]).await.unwrap();
        assert_eq!(failure.ordinal, 1);
        assert!(store.first_failure(&[0]).await.is_none());
    }

    #[test]
    fn test_summary_statistics() {
        let results = vec![
            create_test_result(0, true, 1000),
            create_test_result(1, false, 2000),
            create_test_result(2, true, 3000),
        ];

        let summary = ExecutionSummary::from_results(&results);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_duration, Duration::from_secs(6));
        assert_eq!(summary.average_duration, Duration::from_secs(2));
        assert_eq!(summary.fastest, Duration::from_secs(1));
        assert_eq!(summary.slowest, Duration::from_secs(3));
        assert!((summary.success_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fastest_counts_zero_durations() {
        let results = vec![
            create_test_result(0, true, 0),
            create_test_result(1, true, 40),
        ];

        let summary = ExecutionSummary::from_results(&results);
        assert_eq!(summary.fastest, Duration::ZERO);
        assert_eq!(summary.slowest, Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_empty_summary() {
        let summary = ResultStore::new().summary().await;

        assert_eq!(summary, ExecutionSummary::default());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate(), 0.0);
        assert!(summary.to_string().contains("0/0 (0.0%)"));
        assert!(!summary.to_string().contains("Concurrency"));
        assert!(summary
            .with_concurrency(3)
            .to_string()
            .ends_with("Concurrency used: 3"));
    }

    #[test]
    fn test_cancelled_result() {
        let result = StepResult::cancelled(4);
        assert!(result.is_cancelled());
        assert!(!create_test_result(4, false, 0).is_cancelled());
    }

    #[test]
    fn test_cancelled_is_not_inferred_from_message() {
        let mut result = create_test_result(2, false, 0);
        result.error = Some("execution cancelled".to_string());

        assert!(!result.is_cancelled());
    }
}
