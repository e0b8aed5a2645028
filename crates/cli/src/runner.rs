use anyhow::{bail, Context, Result};
use std::process::Stdio;
use stepflow_core::{StepExecutor, StepSpec};
use tokio::process::Command;

/// Runs each step through an external command, or only logs it when no
/// command is configured.
///
/// The command receives the step through environment variables:
/// `STEPFLOW_ORDINAL`, `STEPFLOW_ROLE`, `STEPFLOW_TASK`, `STEPFLOW_PROMPT`
/// and `STEPFLOW_INSTRUCTION` (the rendered `@role task: prompt` line).
pub struct CommandStepExecutor {
    command: Vec<String>,
}

impl CommandStepExecutor {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn is_simulated(&self) -> bool {
        self.command.is_empty()
    }
}

/// Instruction line handed to the agent for a step
pub fn render_instruction(step: &StepSpec) -> String {
    if step.prompt.is_empty() {
        format!("@{} {}", step.role, step.task)
    } else {
        format!("@{} {}: {}", step.role, step.task, step.prompt)
    }
}

#[async_trait::async_trait]
impl StepExecutor for CommandStepExecutor {
    async fn execute(&self, step: &StepSpec, ordinal: usize) -> Result<()> {
        let instruction = render_instruction(step);

        let Some((program, args)) = self.command.split_first() else {
            tracing::info!(ordinal, "Executing: {}", instruction);
            return Ok(());
        };

        tracing::debug!(ordinal, program = %program, "Running step command");

        let output = Command::new(program)
            .args(args)
            .env("STEPFLOW_ORDINAL", ordinal.to_string())
            .env("STEPFLOW_ROLE", &step.role)
            .env("STEPFLOW_TASK", &step.task)
            .env("STEPFLOW_PROMPT", &step.prompt)
            .env("STEPFLOW_INSTRUCTION", &instruction)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to start '{}'", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("'{}' exited with {}: {}", program, output.status, stderr.trim());
        }

        tracing::debug!(
            ordinal,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "Step command finished"
        );

        Ok(())
    }
}
