use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

use super::analyzer::{analyzer_for, DependencyAnalyzer};
use super::graph::DependencyGraph;
use super::pool::{Deadline, WorkerPool};
use super::progress::{progress_channel, ProgressSink, TracingSink};
use super::results::{ExecutionSummary, ResultStore, StepResult};
use super::step_executor::{StepExecutor, Worker};
use crate::config::ExecutorConfig;
use crate::error::{Result, SchedulerError};
use crate::types::{RunId, StepSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Pending,
    Ready,
    Running,
    Done,
}

/// Runs a workflow's steps in dependency order, as many at a time as the
/// configuration allows.
///
/// Steps whose dependencies are all satisfied form a batch. A batch is
/// dispatched as a whole and the next one starts only after every member
/// has recorded a result. One executor runs one workflow.
pub struct ParallelExecutor {
    run_id: RunId,
    config: ExecutorConfig,
    analyzer: Box<dyn DependencyAnalyzer>,
    sink: Arc<dyn ProgressSink>,
    pool: WorkerPool,
    deadline: Deadline,
    results: ResultStore,
    started: AtomicBool,
}

impl ParallelExecutor {
    /// Create an executor. The run deadline starts counting now.
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;

        let run_id = RunId::new();
        tracing::debug!(
            run_id = %run_id,
            max_concurrency = config.max_concurrency,
            parallel = config.enable_parallel,
            timeout = ?config.timeout(),
            "Created parallel executor"
        );

        Ok(Self {
            run_id,
            analyzer: analyzer_for(config.dependency_strategy),
            sink: Arc::new(TracingSink),
            pool: WorkerPool::new(config.max_concurrency),
            deadline: Deadline::new(config.timeout()),
            results: ResultStore::new(),
            started: AtomicBool::new(false),
            config,
        })
    }

    /// Replace the dependency analyzer chosen by configuration
    pub fn with_analyzer(mut self, analyzer: impl DependencyAnalyzer + 'static) -> Self {
        self.analyzer = Box::new(analyzer);
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Infer and validate the dependency graph without executing anything
    pub fn build_dependency_graph(&self, steps: &[StepSpec]) -> Result<DependencyGraph> {
        if !self.config.dependency_check {
            tracing::debug!(run_id = %self.run_id, "dependency_check is off; validating the graph anyway");
        }

        let graph = DependencyGraph::build(steps, self.analyzer.as_ref())?;

        tracing::info!(
            run_id = %self.run_id,
            total_steps = graph.len(),
            parallel_roots = graph.parallel_roots(),
            edges = graph.edge_count(),
            max_concurrency = self.config.max_concurrency,
            "Dependency analysis complete"
        );

        Ok(graph)
    }

    /// Execute every step, calling `executor` once per step.
    ///
    /// Results recorded before an error stay available through
    /// [`results`](Self::results).
    pub async fn execute(&self, executor: Arc<dyn StepExecutor>, steps: &[StepSpec]) -> Result<()> {
        self.run(executor, steps, None).await
    }

    /// Like [`execute`](Self::execute), but with a graph the caller built.
    ///
    /// The graph is validated before any step runs. In sequential mode it is
    /// only validated; steps still run in index order.
    pub async fn execute_with_graph(
        &self,
        executor: Arc<dyn StepExecutor>,
        steps: &[StepSpec],
        graph: DependencyGraph,
    ) -> Result<()> {
        if graph.len() != steps.len() {
            return Err(SchedulerError::Graph(format!(
                "graph has {} steps but the workflow has {}",
                graph.len(),
                steps.len()
            )));
        }
        graph.validate()?;

        self.run(executor, steps, Some(graph)).await
    }

    async fn run(
        &self,
        executor: Arc<dyn StepExecutor>,
        steps: &[StepSpec],
        graph: Option<DependencyGraph>,
    ) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::Config(
                "executor has already run a workflow".to_string(),
            ));
        }

        tracing::info!(
            run_id = %self.run_id,
            steps = steps.len(),
            parallel = self.config.enable_parallel,
            "Starting workflow execution"
        );

        let steps: Arc<[StepSpec]> = steps.into();
        let (progress, monitor) = progress_channel(self.config.progress_buffer, self.results.clone());
        let stop = self.deadline.child_token();
        let monitor = monitor.spawn(
            steps.len(),
            self.config.progress_interval(),
            self.sink.clone(),
            stop.clone(),
        );

        let worker = Worker {
            run_id: self.run_id,
            executor,
            pool: self.pool.clone(),
            deadline: self.deadline.clone(),
            results: self.results.clone(),
            progress,
            total_steps: steps.len(),
        };

        let outcome = if self.config.enable_parallel {
            let graph = match graph {
                Some(graph) => Ok(graph),
                None => self.build_dependency_graph(&steps),
            };
            match graph {
                Ok(graph) => self.execute_topological(&worker, steps, &graph).await,
                Err(e) => Err(e),
            }
        } else {
            self.execute_sequential(&worker, &steps).await
        };

        stop.cancel();
        if let Err(e) = monitor.await {
            tracing::warn!(run_id = %self.run_id, "Progress monitor ended abnormally: {}", e);
        }

        match &outcome {
            Ok(()) => tracing::info!(run_id = %self.run_id, "Workflow execution completed"),
            Err(e) => tracing::error!(run_id = %self.run_id, error = %e, "Workflow execution failed"),
        }

        outcome
    }

    async fn execute_sequential(&self, worker: &Worker, steps: &[StepSpec]) -> Result<()> {
        tracing::info!(run_id = %self.run_id, "Sequential execution mode (parallel disabled)");

        for (ordinal, step) in steps.iter().enumerate() {
            if self.deadline.is_expired() {
                return Err(self.timeout_error());
            }

            if !worker.run(step, ordinal).await {
                return Err(self.failure_error(self.results.get(ordinal).await, ordinal));
            }
        }

        Ok(())
    }

    async fn execute_topological(
        &self,
        worker: &Worker,
        steps: Arc<[StepSpec]>,
        graph: &DependencyGraph,
    ) -> Result<()> {
        let total = steps.len();
        let mut in_degree: Vec<usize> = (0..total).map(|i| graph.in_degree(i)).collect();
        let mut state = vec![StepState::Pending; total];
        let mut ready: Vec<usize> = Vec::new();
        let mut completed = 0;
        let mut batch_number = 0;

        Self::collect_ready(&in_degree, &mut state, &mut ready);

        while completed < total {
            if self.deadline.is_expired() {
                return Err(self.timeout_error());
            }

            if ready.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.deadlock_poll()) => {}
                    _ = self.deadline.expired() => return Err(self.timeout_error()),
                }

                Self::collect_ready(&in_degree, &mut state, &mut ready);
                if ready.is_empty() {
                    let pending: Vec<usize> = (0..total)
                        .filter(|&i| state[i] == StepState::Pending)
                        .collect();
                    tracing::error!(run_id = %self.run_id, ?pending, "No step can become ready");
                    return Err(SchedulerError::Deadlock { pending });
                }
                continue;
            }

            let batch = std::mem::take(&mut ready);
            batch_number += 1;
            for &ordinal in &batch {
                state[ordinal] = StepState::Running;
            }

            tracing::info!(
                run_id = %self.run_id,
                batch = batch_number,
                size = batch.len(),
                steps = ?batch,
                "Executing batch of parallel steps"
            );

            self.execute_batch(worker, &steps, &batch).await?;

            for &ordinal in &batch {
                state[ordinal] = StepState::Done;
                completed += 1;

                for &dependent in graph.dependents_of(ordinal) {
                    in_degree[dependent] = in_degree[dependent].saturating_sub(1);
                }
            }

            if let Some(failure) = self.results.first_failure(&batch).await {
                let ordinal = failure.ordinal;
                return Err(self.failure_error(Some(failure), ordinal));
            }

            Self::collect_ready(&in_degree, &mut state, &mut ready);
        }

        Ok(())
    }

    /// Dispatch a whole batch and wait until each member has a result.
    ///
    /// If the deadline fires first, the remaining workers are detached: they
    /// still finish and record their results, but nobody waits for them.
    async fn execute_batch(&self, worker: &Worker, steps: &Arc<[StepSpec]>, batch: &[usize]) -> Result<()> {
        let mut workers = JoinSet::new();
        for &ordinal in batch {
            let worker = worker.clone();
            let steps = steps.clone();
            workers.spawn(async move { worker.run(&steps[ordinal], ordinal).await });
        }

        let finished = tokio::select! {
            _ = async {
                while let Some(joined) = workers.join_next().await {
                    if let Err(e) = joined {
                        tracing::error!(run_id = %self.run_id, "Worker task failed: {}", e);
                    }
                }
            } => true,
            _ = self.deadline.expired() => false,
        };

        if !finished {
            workers.detach_all();
            tracing::warn!(run_id = %self.run_id, batch = ?batch, "Deadline reached while batch was running");
            return Err(self.timeout_error());
        }

        for &ordinal in batch {
            if !self.results.contains(ordinal).await {
                return Err(SchedulerError::Step {
                    ordinal,
                    message: "worker exited without recording a result".to_string(),
                });
            }
        }

        Ok(())
    }

    fn collect_ready(in_degree: &[usize], state: &mut [StepState], ready: &mut Vec<usize>) {
        for (ordinal, step_state) in state.iter_mut().enumerate() {
            if *step_state == StepState::Pending && in_degree[ordinal] == 0 {
                *step_state = StepState::Ready;
                ready.push(ordinal);
            }
        }
    }

    fn timeout_error(&self) -> SchedulerError {
        SchedulerError::Timeout {
            budget: self.deadline.budget(),
        }
    }

    fn failure_error(&self, result: Option<StepResult>, ordinal: usize) -> SchedulerError {
        match result {
            Some(result) if result.is_cancelled() => self.timeout_error(),
            Some(result) => SchedulerError::Step {
                ordinal,
                message: result.error.unwrap_or_else(|| "unknown error".to_string()),
            },
            None => SchedulerError::Step {
                ordinal,
                message: "no result recorded".to_string(),
            },
        }
    }

    /// Copy of every result recorded so far
    pub async fn results(&self) -> HashMap<usize, StepResult> {
        self.results.snapshot().await
    }

    pub async fn summary(&self) -> ExecutionSummary {
        let concurrency = if self.config.enable_parallel {
            self.pool.capacity()
        } else {
            1
        };
        self.results.summary().await.with_concurrency(concurrency)
    }

    /// Fire the deadline and close the worker pool. Safe to call repeatedly.
    pub fn cleanup(&self) {
        self.deadline.cancel();
        self.pool.close();
        tracing::debug!(run_id = %self.run_id, "Executor cleaned up");
    }
}
