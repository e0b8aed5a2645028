pub mod analyzer;
pub mod executor;
pub mod graph;
pub mod pool;
pub mod progress;
pub mod results;
pub mod step_executor;

pub use analyzer::{analyzer_for, DeclaredAnalyzer, DependencyAnalyzer, HeuristicAnalyzer};
pub use executor::ParallelExecutor;
pub use graph::{DependencyGraph, StepDependency};
pub use pool::{Deadline, WorkerPool};
pub use progress::{ProgressSink, ProgressStatus, ProgressUpdate, TracingSink};
pub use results::{ExecutionSummary, ResultStore, StepResult};
pub use step_executor::StepExecutor;
