// Capability table and engine registry consulted by the step invoker

use crate::protocol::CallToolResult;
use crate::types::{Workflow, WorkflowId};
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// A named local executor for tool, module or AI steps
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    /// Invoke with the merged step input. `Err` counts as a thrown failure.
    async fn invoke(&self, input: Value) -> Result<CallToolResult>;
}

/// Capability backed by an async closure
pub struct FnCapability<F> {
    f: F,
}

/// Wrap an async closure as a capability
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Capability>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
{
    Arc::new(FnCapability { f })
}

#[async_trait::async_trait]
impl<F, Fut> Capability for FnCapability<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
{
    async fn invoke(&self, input: Value) -> Result<CallToolResult> {
        (self.f)(input).await
    }
}

/// Namespace a capability lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Tool,
    Module,
    Ai,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => write!(f, "Tool"),
            Self::Module => write!(f, "Module"),
            Self::Ai => write!(f, "AI provider"),
        }
    }
}

/// Local capabilities, one namespace per kind
#[derive(Default)]
pub struct CapabilityTable {
    entries: HashMap<CapabilityKind, HashMap<String, Arc<dyn Capability>>>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous one with the same name
    pub fn register(
        &mut self,
        kind: CapabilityKind,
        name: impl Into<String>,
        capability: Arc<dyn Capability>,
    ) -> &mut Self {
        self.entries
            .entry(kind)
            .or_default()
            .insert(name.into(), capability);
        self
    }

    pub fn get(&self, kind: CapabilityKind, name: &str) -> Option<Arc<dyn Capability>> {
        self.entries.get(&kind)?.get(name).cloned()
    }

    pub fn contains(&self, kind: CapabilityKind, name: &str) -> bool {
        self.entries
            .get(&kind)
            .is_some_and(|names| names.contains_key(name))
    }

    /// Registered names of one kind, sorted
    pub fn names(&self, kind: CapabilityKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .get(&kind)
            .map(|names| names.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Another orchestrator a step can delegate to
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    /// Handle a free-form request addressed to the engine
    async fn execute(&self, input: Value) -> Result<CallToolResult>;

    fn get_workflow(&self, workflow_id: &WorkflowId) -> Option<Workflow>;

    /// Run one of the engine's own workflows
    async fn execute_workflow(
        &self,
        workflow_id: &WorkflowId,
        input: Value,
    ) -> Result<CallToolResult>;
}

/// Explicitly constructed lookup of named engines
#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<String, Arc<dyn Engine>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine under its own name
    pub fn register(&self, engine: Arc<dyn Engine>) {
        let name = engine.name().to_string();
        tracing::debug!(engine = %name, "Registered engine");
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, engine);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Engine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All engines, ordered by name
    pub fn get_all(&self) -> Vec<Arc<dyn Engine>> {
        let engines = self.engines.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<Arc<dyn Engine>> = engines.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn names(&self) -> Vec<String> {
        self.get_all().iter().map(|e| e.name().to_string()).collect()
    }
}
