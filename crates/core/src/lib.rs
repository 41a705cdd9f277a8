// Core types and functionality for the Stepwise workflow orchestrator

pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod store;
pub mod template;
pub mod types;
pub mod workflow;

pub use config::{ExecutionMode, GatingPolicy, OrchestratorConfig};
pub use engine::{EngineRequest, WorkflowEngine};
pub use error::{DefinitionError, OrchestratorError, PlanError};
pub use orchestrator::{ExecutionStrategy, Orchestrator, WorkflowRunReport};
pub use protocol::{CallToolResult, ToolContent};
pub use registry::{from_fn, Capability, CapabilityKind, CapabilityTable, Engine, EngineRegistry};
pub use store::{InMemoryWorkflowStore, WorkflowStore};
pub use types::*;
pub use workflow::{
    build_execution_plan, group_steps_by_level, validate_workflow_structure, ExecutionPlan,
    ExecutionPlanEntry, RunContext, ValidationReport, WorkflowGraph,
};
