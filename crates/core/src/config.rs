//! Executor configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SchedulerError};

/// Which dependency inference strategy builds the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStrategy {
    /// Infer edges from artifacts, variables and role pairs
    #[default]
    Heuristic,
    /// Use only the `id` / `after` fields authors put on steps
    Declared,
}

/// Configuration for a parallel executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum number of steps executing at the same time.
    pub max_concurrency: usize,
    /// When false, steps run strictly in order on a single worker.
    pub enable_parallel: bool,
    /// Absolute wall-clock budget for the whole run, in milliseconds.
    pub timeout_ms: u64,
    /// Informational only; acyclicity is always validated.
    pub dependency_check: bool,
    pub dependency_strategy: DependencyStrategy,
    /// Tick of the progress monitor, in milliseconds.
    pub progress_interval_ms: u64,
    /// Rescan interval while waiting for a ready step, in milliseconds.
    pub deadlock_poll_ms: u64,
    /// Capacity of the lossy progress queue.
    pub progress_buffer: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            enable_parallel: true,
            timeout_ms: 5 * 60 * 1000,
            dependency_check: true,
            dependency_strategy: DependencyStrategy::Heuristic,
            progress_interval_ms: 500,
            deadlock_poll_ms: 100,
            progress_buffer: 100,
        }
    }
}

impl ExecutorConfig {
    /// Configuration that runs every step in order on one worker.
    pub fn sequential() -> Self {
        Self {
            enable_parallel: false,
            ..Default::default()
        }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn deadlock_poll(&self) -> Duration {
        Duration::from_millis(self.deadlock_poll_ms)
    }

    /// Reject settings the executor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(SchedulerError::Config(
                "max_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.progress_buffer == 0 {
            return Err(SchedulerError::Config(
                "progress_buffer must be greater than zero".to_string(),
            ));
        }
        if self.progress_interval_ms == 0 || self.deadlock_poll_ms == 0 {
            return Err(SchedulerError::Config(
                "progress_interval_ms and deadlock_poll_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The `parallel` section of a workflow definition.
///
/// Every field is optional so that only what the author wrote overrides the
/// base configuration. A section without a positive `max_concurrency` is
/// ignored entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_parallel: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_check: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_strategy: Option<DependencyStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadlock_poll_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_buffer: Option<usize>,
}

impl ParallelSection {
    /// True if the section names a usable concurrency and should be applied
    pub fn is_active(&self) -> bool {
        self.max_concurrency.is_some_and(|max| max > 0)
    }

    /// Overlay the fields present in this section onto `base`.
    ///
    /// Returns `base` unchanged when the section is inactive.
    pub fn apply_to(&self, mut base: ExecutorConfig) -> ExecutorConfig {
        if !self.is_active() {
            return base;
        }

        if let Some(v) = self.max_concurrency {
            base.max_concurrency = v;
        }
        if let Some(v) = self.enable_parallel {
            base.enable_parallel = v;
        }
        if let Some(v) = self.timeout_ms {
            base.timeout_ms = v;
        }
        if let Some(v) = self.dependency_check {
            base.dependency_check = v;
        }
        if let Some(v) = self.dependency_strategy {
            base.dependency_strategy = v;
        }
        if let Some(v) = self.progress_interval_ms {
            base.progress_interval_ms = v;
        }
        if let Some(v) = self.deadlock_poll_ms {
            base.deadlock_poll_ms = v;
        }
        if let Some(v) = self.progress_buffer {
            base.progress_buffer = v;
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();

        assert_eq!(config.max_concurrency, 4);
        assert!(config.enable_parallel);
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert!(config.dependency_check);
        assert_eq!(config.dependency_strategy, DependencyStrategy::Heuristic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = ExecutorConfig::default().with_max_concurrency(0);
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let config = ExecutorConfig {
            deadlock_poll_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ExecutorConfig {
            progress_buffer: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ExecutorConfig =
            serde_json::from_str(r#"{"max_concurrency": 2, "dependency_strategy": "declared"}"#)
                .unwrap();

        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.dependency_strategy, DependencyStrategy::Declared);
        assert!(config.enable_parallel);
        assert_eq!(config.timeout_ms, 300_000);
    }

    #[test]
    fn test_sequential_builder() {
        let config = ExecutorConfig::sequential().with_timeout(Duration::from_millis(250));
        assert!(!config.enable_parallel);
        assert_eq!(config.timeout_ms, 250);
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let config = ExecutorConfig::default().with_timeout(Duration::MAX);
        assert_eq!(config.timeout_ms, u64::MAX);
    }

    #[test]
    fn test_parallel_section_without_concurrency_is_ignored() {
        let section: ParallelSection =
            serde_json::from_str(r#"{"enable_parallel": false}"#).unwrap();
        let base = ExecutorConfig::default().with_max_concurrency(8);

        assert_eq!(section.max_concurrency, None);
        assert!(!section.is_active());
        assert_eq!(section.apply_to(base.clone()), base);
    }

    #[test]
    fn test_parallel_section_zero_concurrency_is_ignored() {
        let section = ParallelSection {
            max_concurrency: Some(0),
            enable_parallel: Some(false),
            ..Default::default()
        };
        let base = ExecutorConfig::default().with_max_concurrency(8);

        assert_eq!(section.apply_to(base.clone()), base);
    }

    #[test]
    fn test_parallel_section_overlays_present_fields() {
        let section = ParallelSection {
            max_concurrency: Some(2),
            timeout_ms: Some(1_000),
            ..Default::default()
        };
        let base = ExecutorConfig {
            dependency_strategy: DependencyStrategy::Declared,
            ..Default::default()
        };

        let config = section.apply_to(base);

        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.timeout_ms, 1_000);
        assert_eq!(config.dependency_strategy, DependencyStrategy::Declared);
        assert!(config.enable_parallel);
    }
}
