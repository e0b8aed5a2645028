use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stepflow_core::{DependencyStrategy, ExecutorConfig, WorkflowSpec};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Program and arguments run once per step. Empty means simulate.
    #[serde(default)]
    pub command: Vec<String>,
}

/// Settings given on the command line; they win over every file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_concurrency: Option<usize>,
    pub sequential: bool,
    pub timeout_secs: Option<u64>,
    pub strategy: Option<DependencyStrategy>,
}

impl CliConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        if !config_path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .context("Failed to read configuration file")?;
        let config = toml::from_str(&content).context("Failed to parse configuration file")?;

        Ok(config)
    }

    /// Combine this file's executor settings with the workflow's own
    /// `parallel` section and the command line.
    ///
    /// A `parallel` section whose `max_concurrency` is missing or 0 is
    /// ignored; otherwise only the fields it sets override the file.
    pub fn resolve(&self, workflow: &WorkflowSpec, overrides: &Overrides) -> ExecutorConfig {
        let mut config = match &workflow.parallel {
            Some(parallel) if parallel.is_active() => {
                tracing::debug!("Using parallel settings from workflow definition");
                parallel.apply_to(self.executor.clone())
            }
            Some(_) => {
                tracing::debug!("Ignoring workflow parallel section without max_concurrency");
                self.executor.clone()
            }
            None => self.executor.clone(),
        };

        if let Some(max) = overrides.max_concurrency {
            config.max_concurrency = max;
        }
        if overrides.sequential {
            config.enable_parallel = false;
        }
        if let Some(secs) = overrides.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(strategy) = overrides.strategy {
            config.dependency_strategy = strategy;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepflow_core::ParallelSection;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = CliConfig::load(&temp_dir.path().join("stepflow.toml")).unwrap();

        assert_eq!(config.executor, ExecutorConfig::default());
        assert!(config.runner.command.is_empty());
    }

    #[test]
    fn test_load_executor_and_runner_sections() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stepflow.toml");
        std::fs::write(
            &path,
            r#"
[executor]
max_concurrency = 8
dependency_strategy = "declared"

[runner]
command = ["echo", "hello"]
"#,
        )
        .unwrap();

        let config = CliConfig::load(&path).unwrap();

        assert_eq!(config.executor.max_concurrency, 8);
        assert_eq!(config.executor.dependency_strategy, DependencyStrategy::Declared);
        assert!(config.executor.enable_parallel);
        assert_eq!(config.runner.command, vec!["echo", "hello"]);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stepflow.toml");
        std::fs::write(&path, "[executor\nmax_concurrency = ").unwrap();

        let err = CliConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse configuration file"));
    }

    fn parallel_section(max_concurrency: Option<usize>) -> Option<ParallelSection> {
        Some(ParallelSection {
            max_concurrency,
            ..Default::default()
        })
    }

    #[test]
    fn test_workflow_section_overrides_file_settings() {
        let file = CliConfig {
            executor: ExecutorConfig {
                dependency_strategy: DependencyStrategy::Declared,
                ..ExecutorConfig::default().with_max_concurrency(8)
            },
            ..Default::default()
        };
        let workflow = WorkflowSpec {
            parallel: parallel_section(Some(2)),
            ..Default::default()
        };

        let config = file.resolve(&workflow, &Overrides::default());
        assert_eq!(config.max_concurrency, 2);
        // Fields the section leaves out keep the file's values
        assert_eq!(config.dependency_strategy, DependencyStrategy::Declared);
    }

    #[test]
    fn test_workflow_section_without_concurrency_ignored() {
        let file = CliConfig {
            executor: ExecutorConfig::default().with_max_concurrency(8),
            ..Default::default()
        };
        let workflow: WorkflowSpec = serde_yaml::from_str(
            r#"
name: partial
steps:
  - role: dev
    task: implement
parallel:
  enable_parallel: false
"#,
        )
        .unwrap();

        let config = file.resolve(&workflow, &Overrides::default());

        assert_eq!(config.max_concurrency, 8);
        assert!(config.enable_parallel);
    }

    #[test]
    fn test_zero_concurrency_workflow_section_ignored() {
        let file = CliConfig {
            executor: ExecutorConfig::default().with_max_concurrency(8),
            ..Default::default()
        };
        let workflow = WorkflowSpec {
            parallel: parallel_section(Some(0)),
            ..Default::default()
        };

        let config = file.resolve(&workflow, &Overrides::default());
        assert_eq!(config.max_concurrency, 8);
    }

    #[test]
    fn test_flags_win() {
        let workflow = WorkflowSpec {
            parallel: parallel_section(Some(2)),
            ..Default::default()
        };
        let overrides = Overrides {
            max_concurrency: Some(6),
            sequential: true,
            timeout_secs: Some(30),
            strategy: Some(DependencyStrategy::Declared),
        };

        let config = CliConfig::default().resolve(&workflow, &overrides);

        assert_eq!(config.max_concurrency, 6);
        assert!(!config.enable_parallel);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.dependency_strategy, DependencyStrategy::Declared);
    }
}
