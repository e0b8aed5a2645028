use crate::error::{Result, SchedulerError};
use crate::types::StepSpec;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{depth_first_search, Control, DfsEvent};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::analyzer::DependencyAnalyzer;

/// What the analyzer concluded about one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDependency {
    pub ordinal: usize,
    /// Earlier ordinals this step waits for
    pub dependencies: Vec<usize>,
    pub outputs: BTreeSet<String>,
    pub inputs: BTreeSet<String>,
}

/// Dependency graph over step ordinals.
///
/// Built once per run and never mutated afterwards. Every ordinal in
/// `0..len()` has an in-degree entry, and the in-degrees sum to the number
/// of adjacency edges.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    steps: Vec<StepDependency>,
    adjacency: HashMap<usize, Vec<usize>>,
    in_degree: HashMap<usize, usize>,
}

impl DependencyGraph {
    /// Infer edges between steps and validate the result.
    ///
    /// Only earlier steps are considered as producers, so a step can never
    /// depend on one declared after it. Quadratic in the number of steps.
    pub fn build(steps: &[StepSpec], analyzer: &dyn DependencyAnalyzer) -> Result<Self> {
        let mut nodes = Vec::with_capacity(steps.len());
        let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut in_degree: HashMap<usize, usize> = HashMap::new();

        for (i, step) in steps.iter().enumerate() {
            let mut dependencies = Vec::new();

            for (j, earlier) in steps[..i].iter().enumerate() {
                if analyzer.depends_on(earlier, step) {
                    dependencies.push(j);
                    adjacency.entry(j).or_default().push(i);
                    *in_degree.entry(i).or_insert(0) += 1;
                }
            }

            in_degree.entry(i).or_insert(0);
            nodes.push(StepDependency {
                ordinal: i,
                dependencies,
                outputs: analyzer.outputs(step),
                inputs: analyzer.inputs(step),
            });
        }

        let graph = Self {
            steps: nodes,
            adjacency,
            in_degree,
        };
        graph.validate()?;

        Ok(graph)
    }

    /// Assemble a graph from explicit edges (producer -> dependents).
    ///
    /// Unlike [`build`](Self::build) this does not check for cycles; call
    /// [`validate`](Self::validate) before executing it.
    pub fn from_adjacency(step_count: usize, adjacency: HashMap<usize, Vec<usize>>) -> Result<Self> {
        let mut steps: Vec<StepDependency> = (0..step_count)
            .map(|ordinal| StepDependency {
                ordinal,
                dependencies: Vec::new(),
                outputs: BTreeSet::new(),
                inputs: BTreeSet::new(),
            })
            .collect();
        let mut in_degree: HashMap<usize, usize> = (0..step_count).map(|i| (i, 0)).collect();

        for (&from, dependents) in &adjacency {
            if from >= step_count {
                return Err(SchedulerError::Graph(format!(
                    "edge from unknown step {}",
                    from
                )));
            }
            for &to in dependents {
                if to >= step_count {
                    return Err(SchedulerError::Graph(format!(
                        "edge from step {} to unknown step {}",
                        from, to
                    )));
                }
                steps[to].dependencies.push(from);
                *in_degree.entry(to).or_insert(0) += 1;
            }
        }

        for step in &mut steps {
            step.dependencies.sort_unstable();
        }

        Ok(Self {
            steps,
            adjacency,
            in_degree,
        })
    }

    /// Depth-first cycle check; names the step that closes the cycle.
    pub fn validate(&self) -> Result<()> {
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::with_capacity(self.len(), 0);
        for ordinal in 0..self.len() {
            graph.add_node(ordinal);
        }
        for (&from, dependents) in &self.adjacency {
            for &to in dependents {
                graph.add_edge(from, to, ());
            }
        }

        let outcome = depth_first_search(&graph, 0..self.len(), |event| {
            if let DfsEvent::BackEdge(_, ordinal) = event {
                return Control::Break(ordinal);
            }
            Control::Continue
        });

        match outcome {
            Control::Break(ordinal) => Err(SchedulerError::Cycle { ordinal }),
            _ => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[StepDependency] {
        &self.steps
    }

    pub fn adjacency(&self) -> &HashMap<usize, Vec<usize>> {
        &self.adjacency
    }

    pub fn in_degrees(&self) -> &HashMap<usize, usize> {
        &self.in_degree
    }

    /// Number of unresolved dependencies of a step before anything runs
    pub fn in_degree(&self, ordinal: usize) -> usize {
        self.in_degree.get(&ordinal).copied().unwrap_or(0)
    }

    /// Steps that wait for `ordinal`
    pub fn dependents_of(&self, ordinal: usize) -> &[usize] {
        self.adjacency
            .get(&ordinal)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Steps `ordinal` waits for
    pub fn dependencies_of(&self, ordinal: usize) -> &[usize] {
        self.steps
            .get(ordinal)
            .map(|s| s.dependencies.as_slice())
            .unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    /// Steps that can start immediately
    pub fn parallel_roots(&self) -> usize {
        (0..self.len()).filter(|&i| self.in_degree(i) == 0).count()
    }
}
