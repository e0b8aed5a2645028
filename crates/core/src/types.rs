use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::ParallelSection;

/// Unique identifier for a scheduler run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a step that renders a template or checklist talks to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    Interactive,
    Yolo,
}

/// Specification for a single workflow step.
///
/// The scheduler never performs the step's work itself; it only reads the
/// role, task, artifact paths and variable keys to infer dependencies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Optional author-assigned name, referenced by `after` on later steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "agent")]
    pub role: String,
    pub task: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<StepMode>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    /// Ids of earlier steps this one must wait for (declared strategy only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

impl StepSpec {
    pub fn new(role: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            task: task.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_template(mut self, path: impl Into<String>) -> Self {
        self.template = Some(path.into());
        self
    }

    pub fn with_checklist(mut self, path: impl Into<String>) -> Self {
        self.checklist = Some(path.into());
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    pub fn with_after(mut self, id: impl Into<String>) -> Self {
        self.after.push(id.into());
        self
    }

    /// True if the step renders a template (an empty path counts as none)
    pub fn has_template(&self) -> bool {
        self.template.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// True if the step runs a checklist (an empty path counts as none)
    pub fn has_checklist(&self) -> bool {
        self.checklist.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Short label used in progress messages
    pub fn label(&self) -> &str {
        if self.task.is_empty() {
            &self.role
        } else {
            &self.task
        }
    }
}

/// A workflow definition: an ordered list of steps plus optional run settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelSection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_artifact_paths_count_as_absent() {
        let step = StepSpec::new("dev", "implement")
            .with_template("")
            .with_checklist("");
        assert!(!step.has_template());
        assert!(!step.has_checklist());

        let step = StepSpec::new("dev", "implement").with_template("story.yaml");
        assert!(step.has_template());
    }

    #[test]
    fn test_step_accepts_agent_alias() {
        let step: StepSpec = serde_json::from_str(
            r#"{"agent": "architect", "task": "design", "template": "arch.yaml"}"#,
        )
        .unwrap();

        assert_eq!(step.role, "architect");
        assert_eq!(step.template.as_deref(), Some("arch.yaml"));
        assert!(step.variables.is_empty());
        assert!(step.after.is_empty());
    }

    #[test]
    fn test_label_falls_back_to_role() {
        assert_eq!(StepSpec::new("qa", "validate").label(), "validate");
        assert_eq!(StepSpec::new("qa", "").label(), "qa");
    }
}
