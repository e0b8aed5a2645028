//! Error types for the step scheduler.

use std::time::Duration;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Coarse classification of a [`SchedulerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Graph,
    Cycle,
    Step,
    Timeout,
    Deadlock,
}

/// Errors that abort a scheduler run.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Invalid executor configuration, rejected before any graph work.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A graph was assembled with an edge to an unknown step.
    #[error("Invalid dependency graph: {0}")]
    Graph(String),

    /// The dependency graph is not a DAG. No step has run.
    #[error("Circular dependency detected involving step {ordinal}")]
    Cycle { ordinal: usize },

    /// A step's callback failed. Results up to and including its batch are kept.
    #[error("Step {} failed: {message}", .ordinal + 1)]
    Step { ordinal: usize, message: String },

    /// The run-wide deadline elapsed before every step finished.
    #[error("Execution timed out after {budget:?}")]
    Timeout { budget: Duration },

    /// Steps remain but none can ever become ready.
    #[error("Execution deadlock detected: steps {pending:?} can never proceed")]
    Deadlock { pending: Vec<usize> },
}

impl SchedulerError {
    /// Classify this error without matching on its message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Graph(_) => ErrorKind::Graph,
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::Step { .. } => ErrorKind::Step,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Deadlock { .. } => ErrorKind::Deadlock,
        }
    }

    /// True if the error was raised before any step executed.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Config | ErrorKind::Graph | ErrorKind::Cycle
        )
    }
}
