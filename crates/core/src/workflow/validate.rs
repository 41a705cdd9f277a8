// Structural validation of a workflow graph

use super::graph::{EdgeKind, WorkflowGraph};
use crate::types::StepId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of structural validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Validate the structure of a workflow graph
pub fn validate_workflow_structure(graph: &WorkflowGraph) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if graph.nodes.is_empty() {
        errors.push("Workflow must contain at least one step".to_string());
        return ValidationReport {
            valid: false,
            errors,
            warnings,
        };
    }

    let mut dag: DiGraph<&StepId, EdgeKind> = DiGraph::new();
    let mut indices: HashMap<&StepId, NodeIndex> = HashMap::new();
    for node in &graph.nodes {
        if indices.contains_key(node.id()) {
            errors.push(format!("Duplicate step id \"{}\"", node.id()));
            continue;
        }
        indices.insert(node.id(), dag.add_node(node.id()));
    }

    // 1. every edge endpoint must resolve
    for edge in &graph.edges {
        let from = indices.get(&edge.from);
        let to = indices.get(&edge.to);
        match (from, to) {
            (Some(&from), Some(&to)) => {
                dag.add_edge(from, to, edge.kind);
            }
            (None, _) => errors.push(format!(
                "Edge {} starts at unknown step \"{}\"",
                edge.kind, edge.from
            )),
            (Some(_), None) => errors.push(format!(
                "Step \"{}\" references unknown step \"{}\" via {}",
                edge.from, edge.to, edge.kind
            )),
        }
    }

    let roots: Vec<NodeIndex> = dag
        .node_indices()
        .filter(|&n| dag.neighbors_directed(n, Direction::Incoming).next().is_none())
        .collect();

    // 2. no cycles
    for step_id in find_cycles(&dag, &roots) {
        errors.push(format!(
            "Circular dependency detected involving step \"{}\"",
            step_id
        ));
    }

    // 3. reachability from roots (warning only)
    let mut reachable = vec![false; dag.node_count()];
    for &root in &roots {
        let mut dfs = Dfs::new(&dag, root);
        while let Some(n) = dfs.next(&dag) {
            reachable[n.index()] = true;
        }
    }
    for n in dag.node_indices() {
        if !reachable[n.index()] {
            warnings.push(format!(
                "Step \"{}\" is not reachable from any root step",
                dag[n]
            ));
        }
    }

    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Depth-first search with an explicit recursion stack.
///
/// Returns the step each back-edge points at, roots first, then any part of
/// the graph no root leads into.
fn find_cycles(dag: &DiGraph<&StepId, EdgeKind>, roots: &[NodeIndex]) -> Vec<StepId> {
    let mut marks = vec![Mark::Unvisited; dag.node_count()];
    let mut cycles: Vec<StepId> = Vec::new();

    let starts = roots.iter().copied().chain(dag.node_indices());
    for start in starts {
        if marks[start.index()] != Mark::Unvisited {
            continue;
        }

        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = Vec::new();
        marks[start.index()] = Mark::OnStack;
        stack.push((start, successors(dag, start)));

        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            match pending.pop() {
                Some(next) => match marks[next.index()] {
                    Mark::OnStack => {
                        let id = dag[next].clone();
                        if !cycles.contains(&id) {
                            cycles.push(id);
                        }
                    }
                    Mark::Unvisited => {
                        marks[next.index()] = Mark::OnStack;
                        stack.push((next, successors(dag, next)));
                    }
                    Mark::Done => {}
                },
                None => {
                    marks[node.index()] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }

    cycles
}

/// Successors reversed so that popping visits them in edge order
fn successors(dag: &DiGraph<&StepId, EdgeKind>, node: NodeIndex) -> Vec<NodeIndex> {
    let mut next: Vec<NodeIndex> = dag.neighbors_directed(node, Direction::Outgoing).collect();
    next.sort_by_key(|n| std::cmp::Reverse(n.index()));
    next.dedup();
    next
}
