use anyhow::{bail, Context, Result};
use std::path::Path;
use stepflow_core::WorkflowSpec;

/// Read a workflow definition, picking the format from the file extension
pub fn load(path: &Path) -> Result<WorkflowSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let workflow: WorkflowSpec = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).context("Failed to parse YAML workflow")?,
        "toml" => toml::from_str(&content).context("Failed to parse TOML workflow")?,
        "json" => serde_json::from_str(&content).context("Failed to parse JSON workflow")?,
        other => bail!(
            "Unsupported workflow format '{}' (expected yaml, yml, toml or json)",
            other
        ),
    };

    if workflow.steps.is_empty() {
        bail!("Workflow has no steps: {}", path.display());
    }

    tracing::info!(
        "Loaded workflow '{}' with {} steps from {}",
        workflow.name,
        workflow.steps.len(),
        path.display()
    );

    Ok(workflow)
}
