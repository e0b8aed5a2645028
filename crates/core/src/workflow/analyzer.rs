use std::collections::BTreeSet;

use crate::config::DependencyStrategy;
use crate::types::StepSpec;

pub const TEMPLATE_OUTPUT: &str = "template_output";
pub const CHECKLIST_REPORT: &str = "checklist_report";

const OUTPUT_KEYS: [&str; 2] = ["output_file", "generates"];
const INPUT_KEYS: [&str; 2] = ["input_file", "requires"];

/// Decides whether one step must finish before another may start.
///
/// Graph construction only ever asks about earlier producers and later
/// consumers, so implementations don't need to guard against ordering.
pub trait DependencyAnalyzer: Send + Sync {
    /// Tags describing what a step produces
    fn outputs(&self, step: &StepSpec) -> BTreeSet<String>;

    /// Tags describing what a step consumes
    fn inputs(&self, step: &StepSpec) -> BTreeSet<String>;

    /// True if `consumer` must wait for `producer`
    fn depends_on(&self, producer: &StepSpec, consumer: &StepSpec) -> bool {
        let outputs = self.outputs(producer);
        self.inputs(consumer).iter().any(|tag| outputs.contains(tag))
    }
}

/// Best-effort inference from step metadata.
///
/// This is a heuristic, not a contract: two steps with no shared tag and no
/// matching role pair are treated as independent even if the author meant
/// otherwise. Use [`DeclaredAnalyzer`] when ordering has to be exact.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    fn is_validation_step(step: &StepSpec) -> bool {
        step.role == "qa" || step.task == "validate"
    }

    fn role_pair_rule(producer: &StepSpec, consumer: &StepSpec) -> bool {
        match producer.role.as_str() {
            "architect" => consumer.role == "dev",
            "po" => matches!(consumer.role.as_str(), "sm" | "dev"),
            _ => false,
        }
    }
}

fn variable_tags(step: &StepSpec, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter(|key| step.variables.contains_key(**key))
        .map(|key| format!("var_{}", key))
        .collect()
}

impl DependencyAnalyzer for HeuristicAnalyzer {
    fn outputs(&self, step: &StepSpec) -> BTreeSet<String> {
        let mut outputs = BTreeSet::new();

        if step.has_template() {
            outputs.insert(TEMPLATE_OUTPUT.to_string());
        }
        if step.has_checklist() {
            outputs.insert(CHECKLIST_REPORT.to_string());
        }
        outputs.extend(variable_tags(step, &OUTPUT_KEYS));

        outputs
    }

    fn inputs(&self, step: &StepSpec) -> BTreeSet<String> {
        let mut inputs = BTreeSet::new();

        if Self::is_validation_step(step) {
            inputs.insert(TEMPLATE_OUTPUT.to_string());
            inputs.insert(CHECKLIST_REPORT.to_string());
        }
        inputs.extend(variable_tags(step, &INPUT_KEYS));

        inputs
    }

    fn depends_on(&self, producer: &StepSpec, consumer: &StepSpec) -> bool {
        let outputs = self.outputs(producer);
        self.inputs(consumer).iter().any(|tag| outputs.contains(tag))
            || Self::role_pair_rule(producer, consumer)
    }
}

/// Dependencies written down by the workflow author.
///
/// A step with `id = "x"` produces the tag `step:x`; a step listing `"x"` in
/// `after` consumes it. Nothing else creates an edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredAnalyzer;

impl DependencyAnalyzer for DeclaredAnalyzer {
    fn outputs(&self, step: &StepSpec) -> BTreeSet<String> {
        step.id.iter().map(|id| format!("step:{}", id)).collect()
    }

    fn inputs(&self, step: &StepSpec) -> BTreeSet<String> {
        step.after.iter().map(|id| format!("step:{}", id)).collect()
    }
}

/// Build the analyzer selected by configuration
pub fn analyzer_for(strategy: DependencyStrategy) -> Box<dyn DependencyAnalyzer> {
    match strategy {
        DependencyStrategy::Heuristic => Box::new(HeuristicAnalyzer),
        DependencyStrategy::Declared => Box::new(DeclaredAnalyzer),
    }
}
