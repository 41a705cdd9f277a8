// Error types for the orchestration core

use crate::types::{StepId, WorkflowId};

/// A workflow definition breaks one of its own invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    /// The workflow declares no steps.
    #[error("workflow {workflow_id} must contain at least one step")]
    NoSteps { workflow_id: WorkflowId },

    /// Two steps share an id.
    #[error("workflow {workflow_id} declares step {step_id} more than once")]
    DuplicateStepId {
        workflow_id: WorkflowId,
        step_id: StepId,
    },

    /// A step uses the terminal marker as its id.
    #[error("workflow {workflow_id} uses the reserved step id \"end\"")]
    ReservedStepId { workflow_id: WorkflowId },
}

/// The planner refused to order a graph.
///
/// Only reachable when validation was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// An edge points at a step that is not in the graph.
    #[error("edge references unknown step {step_id}")]
    UnknownStep { step_id: StepId },

    #[error("step {step_id} appears more than once")]
    DuplicateStep { step_id: StepId },

    /// Steps left over after topological ordering, i.e. a cycle.
    #[error("could not order steps {}: graph contains a cycle", join_ids(.remaining))]
    Cycle { remaining: Vec<StepId> },
}

/// Failures of `execute_workflow` itself. Step failures never surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("workflow {workflow_id} not found")]
    WorkflowNotFound { workflow_id: WorkflowId },

    #[error(transparent)]
    InvalidDefinition(#[from] DefinitionError),

    #[error("workflow {workflow_id} failed validation: {}", .errors.join("; "))]
    ValidationFailed {
        workflow_id: WorkflowId,
        errors: Vec<String>,
    },

    #[error(transparent)]
    Planning(#[from] PlanError),
}

fn join_ids(ids: &[StepId]) -> String {
    ids.iter()
        .map(StepId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
