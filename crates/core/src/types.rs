use crate::error::DefinitionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// Reserved transition target meaning "stop here".
pub const TERMINAL_MARKER: &str = "end";

/// Unique identifier for a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a workflow step
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a workflow definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where control goes after a step finishes.
///
/// Serialized as a bare string; `"end"` is the terminal marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Transition {
    Next(StepId),
    End,
}

impl Transition {
    pub fn next(id: impl Into<String>) -> Self {
        Self::Next(StepId::new(id))
    }

    /// The target step, unless this is the terminal marker.
    pub fn target(&self) -> Option<&StepId> {
        match self {
            Self::Next(id) => Some(id),
            Self::End => None,
        }
    }
}

impl From<String> for Transition {
    fn from(value: String) -> Self {
        if value == TERMINAL_MARKER {
            Self::End
        } else {
            Self::Next(StepId(value))
        }
    }
}

impl From<Transition> for String {
    fn from(value: Transition) -> Self {
        match value {
            Transition::Next(id) => id.0,
            Transition::End => TERMINAL_MARKER.to_string(),
        }
    }
}

/// Executor family a step is dispatched to, with only the fields it needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Invoke a local tool
    Tool { target: String },
    /// Invoke a local module
    Module { target: String },
    /// Call an AI provider through the capability table
    Ai { provider: String },
    /// Delegate to another named engine, optionally to one of its workflows
    Engine {
        engine: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workflow: Option<WorkflowId>,
    },
}

impl StepAction {
    /// Name of the capability or engine this action addresses
    pub fn target(&self) -> &str {
        match self {
            Self::Tool { target } | Self::Module { target } => target,
            Self::Ai { provider } => provider,
            Self::Engine { engine, .. } => engine,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Tool { .. } => "tool",
            Self::Module { .. } => "module",
            Self::Ai { .. } => "ai",
            Self::Engine { .. } => "engine",
        }
    }
}

/// A single unit of work in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub action: StepAction,
    #[serde(default)]
    pub input: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Transition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<Transition>,
}

impl Step {
    pub fn new(id: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: StepId::new(id),
            action,
            input: Map::new(),
            on_success: None,
            on_failure: None,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        if let Value::Object(map) = input {
            self.input = map;
        }
        self
    }

    pub fn on_success(mut self, transition: Transition) -> Self {
        self.on_success = Some(transition);
        self
    }

    pub fn on_failure(mut self, transition: Transition) -> Self {
        self.on_failure = Some(transition);
        self
    }

    /// Non-terminal success target
    pub fn success_target(&self) -> Option<&StepId> {
        self.on_success.as_ref().and_then(Transition::target)
    }

    /// Non-terminal failure target
    pub fn failure_target(&self) -> Option<&StepId> {
        self.on_failure.as_ref().and_then(Transition::target)
    }

    /// True when success and failure point at two different steps.
    pub fn branches(&self) -> bool {
        matches!(
            (self.success_target(), self.failure_target()),
            (Some(a), Some(b)) if a != b
        )
    }
}

/// A declarative workflow: an ordered list of steps plus starting state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub initial_state: Map<String, Value>,
    pub steps: Vec<Step>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: WorkflowId::new(id),
            name: name.into(),
            description: String::new(),
            initial_state: Map::new(),
            steps,
        }
    }

    /// Check the invariants every definition must hold before graph building.
    pub fn check(&self) -> Result<(), DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::NoSteps {
                workflow_id: self.id.clone(),
            });
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.as_str() == TERMINAL_MARKER {
                return Err(DefinitionError::ReservedStepId {
                    workflow_id: self.id.clone(),
                });
            }
            if !seen.insert(&step.id) {
                return Err(DefinitionError::DuplicateStepId {
                    workflow_id: self.id.clone(),
                    step_id: step.id.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }
}

/// Terminal status of an attempted step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// Outcome of one attempted step, appended to the run log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_id: StepId,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionResult {
    pub fn completed(step_id: StepId, output: Value) -> Self {
        Self {
            step_id,
            status: StepStatus::Completed,
            output: Some(output),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn failed(step_id: StepId, error: impl Into<String>) -> Self {
        Self {
            step_id,
            status: StepStatus::Failed,
            output: None,
            error: Some(error.into()),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn timed(mut self, started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self.completed_at = Some(completed_at);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}
