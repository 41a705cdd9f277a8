// Graph builder: workflow steps become nodes, branch transitions become edges

use crate::types::{Step, StepId, Workflow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which branch of the source step an edge belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Success,
    Failure,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "on_success"),
            Self::Failure => write!(f, "on_failure"),
        }
    }
}

/// A step together with its position in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub index: usize,
    pub step: Step,
}

impl Node {
    pub fn id(&self) -> &StepId {
        &self.step.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: StepId,
    pub to: StepId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            from: StepId::new(from),
            to: StepId::new(to),
            kind,
        }
    }
}

/// Nodes and edges derived from one workflow for one planning pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Build the graph for a workflow
    pub fn build(workflow: &Workflow) -> Self {
        let nodes: Vec<Node> = workflow
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| Node {
                index,
                step: step.clone(),
            })
            .collect();

        let mut edges = Vec::new();
        for step in &workflow.steps {
            if let Some(target) = step.success_target() {
                edges.push(Edge {
                    from: step.id.clone(),
                    to: target.clone(),
                    kind: EdgeKind::Success,
                });
            }
            if let Some(target) = step.failure_target() {
                edges.push(Edge {
                    from: step.id.clone(),
                    to: target.clone(),
                    kind: EdgeKind::Failure,
                });
            }
        }

        Self { nodes, edges }
    }

    pub fn node(&self, id: &StepId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// Nodes no edge points at
    pub fn roots(&self) -> Vec<&Node> {
        let targets: HashSet<&StepId> = self.edges.iter().map(|e| &e.to).collect();
        self.nodes
            .iter()
            .filter(|n| !targets.contains(n.id()))
            .collect()
    }

    /// Edges pointing at the given step, in declaration order
    pub fn incoming<'a>(&'a self, id: &'a StepId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.to == id)
    }
}
