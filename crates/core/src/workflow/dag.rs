use super::graph::{EdgeKind, WorkflowGraph};
use crate::error::PlanError;
use crate::types::StepId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// One step's slot in the execution plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlanEntry {
    pub declaration_index: usize,
    pub step_id: StepId,
    /// Longest edge chain from a root to this step
    pub level: usize,
    /// Steps with an edge into this one
    pub dependencies: BTreeSet<StepId>,
}

/// Entries ordered by level, then declaration index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionPlan {
    entries: Vec<ExecutionPlanEntry>,
}

impl ExecutionPlan {
    pub fn entries(&self) -> &[ExecutionPlanEntry] {
        &self.entries
    }

    pub fn entry(&self, step_id: &StepId) -> Option<&ExecutionPlanEntry> {
        self.entries.iter().find(|e| &e.step_id == step_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.entries.iter().map(|e| e.level + 1).max().unwrap_or(0)
    }

    /// Step ids per level; each level lists its steps in declaration order
    pub fn group_by_level(&self) -> BTreeMap<usize, Vec<StepId>> {
        let mut levels: BTreeMap<usize, Vec<StepId>> = BTreeMap::new();
        for entry in &self.entries {
            levels.entry(entry.level).or_default().push(entry.step_id.clone());
        }
        levels
    }
}

/// DAG representation of a workflow graph
pub struct WorkflowDag {
    graph: DiGraph<StepId, EdgeKind>,
    declaration: Vec<usize>,
    step_indices: HashMap<StepId, NodeIndex>,
}

impl WorkflowDag {
    /// Index a workflow graph; fails on dangling edges or duplicate ids
    pub fn from_graph(workflow_graph: &WorkflowGraph) -> Result<Self, PlanError> {
        let mut graph = DiGraph::new();
        let mut declaration = Vec::with_capacity(workflow_graph.nodes.len());
        let mut step_indices = HashMap::new();

        for node in &workflow_graph.nodes {
            let index = graph.add_node(node.id().clone());
            declaration.push(node.index);
            if step_indices.insert(node.id().clone(), index).is_some() {
                return Err(PlanError::DuplicateStep {
                    step_id: node.id().clone(),
                });
            }
        }

        for edge in &workflow_graph.edges {
            let from = step_indices
                .get(&edge.from)
                .ok_or_else(|| PlanError::UnknownStep {
                    step_id: edge.from.clone(),
                })?;
            let to = step_indices
                .get(&edge.to)
                .ok_or_else(|| PlanError::UnknownStep {
                    step_id: edge.to.clone(),
                })?;

            graph.add_edge(*from, *to, edge.kind);
        }

        Ok(Self {
            graph,
            declaration,
            step_indices,
        })
    }

    /// Get dependencies (in-edge sources) for a step
    pub fn dependencies(&self, step_id: &StepId) -> Option<BTreeSet<StepId>> {
        let node = self.step_indices.get(step_id)?;

        Some(
            self.graph
                .neighbors_directed(*node, Direction::Incoming)
                .map(|n| self.graph[n].clone())
                .collect(),
        )
    }

    /// Steps with no incoming edges, in declaration order
    pub fn entry_steps(&self) -> Vec<StepId> {
        let mut entries: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect();
        entries.sort_by_key(|n| self.declaration[n.index()]);
        entries.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    /// Kahn's algorithm, then one bucket per level in declaration order.
    ///
    /// A step's level is one more than the deepest of its predecessors.
    /// Steps left unordered mean a cycle, and the whole plan is refused.
    pub fn plan(&self) -> Result<ExecutionPlan, PlanError> {
        let count = self.graph.node_count();
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.edges_directed(n, Direction::Incoming).count())
            .collect();
        let mut levels = vec![0usize; count];
        let mut ordered = vec![false; count];

        let mut ready: VecDeque<usize> = self
            .graph
            .node_indices()
            .map(|n| n.index())
            .filter(|&index| in_degree[index] == 0)
            .collect();

        while let Some(index) = ready.pop_front() {
            ordered[index] = true;
            let node = NodeIndex::new(index);

            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                let target = edge.target().index();
                levels[target] = levels[target].max(levels[index] + 1);
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    ready.push_back(target);
                }
            }
        }

        let remaining: Vec<StepId> = self
            .graph
            .node_indices()
            .filter(|n| !ordered[n.index()])
            .map(|n| self.graph[n].clone())
            .collect();
        if !remaining.is_empty() {
            return Err(PlanError::Cycle { remaining });
        }

        let mut by_declaration: Vec<NodeIndex> = self.graph.node_indices().collect();
        by_declaration.sort_by_key(|n| self.declaration[n.index()]);

        let depth = levels.iter().max().map_or(0, |deepest| deepest + 1);
        let mut buckets: Vec<Vec<ExecutionPlanEntry>> = vec![Vec::new(); depth];
        for n in by_declaration {
            buckets[levels[n.index()]].push(ExecutionPlanEntry {
                declaration_index: self.declaration[n.index()],
                step_id: self.graph[n].clone(),
                level: levels[n.index()],
                dependencies: self
                    .graph
                    .neighbors_directed(n, Direction::Incoming)
                    .map(|p| self.graph[p].clone())
                    .collect(),
            });
        }
        let entries: Vec<ExecutionPlanEntry> = buckets.into_iter().flatten().collect();

        tracing::debug!(
            steps = entries.len(),
            levels = depth,
            "Built execution plan"
        );

        Ok(ExecutionPlan { entries })
    }
}

/// Build a leveled execution plan for a workflow graph
pub fn build_execution_plan(graph: &WorkflowGraph) -> Result<ExecutionPlan, PlanError> {
    WorkflowDag::from_graph(graph)?.plan()
}

/// Group a plan's step ids by level
pub fn group_steps_by_level(plan: &ExecutionPlan) -> BTreeMap<usize, Vec<StepId>> {
    plan.group_by_level()
}
