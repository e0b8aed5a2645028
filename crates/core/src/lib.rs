// Core types and scheduling for Stepflow

pub mod config;
pub mod error;
pub mod types;
pub mod workflow;

pub use config::{DependencyStrategy, ExecutorConfig, ParallelSection};
pub use error::{ErrorKind, Result, SchedulerError};
pub use types::*;
pub use workflow::{
    ExecutionSummary, ParallelExecutor, ProgressSink, ProgressStatus, ProgressUpdate,
    StepExecutor, StepResult,
};
