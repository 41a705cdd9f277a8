// Graph building, validation, planning and leveled execution

pub mod context;
pub mod dag;
pub mod executor;
pub mod graph;
pub mod linear;
pub mod step_executor;
pub mod validate;

pub use context::RunContext;
pub use dag::{
    build_execution_plan, group_steps_by_level, ExecutionPlan, ExecutionPlanEntry, WorkflowDag,
};
pub use executor::{RunOutcome, WorkflowExecutor, DEPENDENCIES_NOT_SATISFIED};
pub use graph::{Edge, EdgeKind, Node, WorkflowGraph};
pub use linear::{execute_linear, is_linear_chain, LINEAR_FALLBACK_MAX_STEPS};
pub use step_executor::StepInvoker;
pub use validate::{validate_workflow_structure, ValidationReport};
