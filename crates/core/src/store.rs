// Workflow definition lookup

use crate::error::DefinitionError;
use crate::types::{Workflow, WorkflowId};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Source of workflow definitions for an orchestrator
pub trait WorkflowStore: Send + Sync {
    fn get(&self, workflow_id: &WorkflowId) -> Option<Workflow>;

    /// All definitions, ordered by id
    fn list(&self) -> Vec<Workflow>;

    /// Add or replace a definition after checking its invariants
    fn register(&self, workflow: Workflow) -> Result<(), DefinitionError>;
}

/// Process-local store backed by a map
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<BTreeMap<WorkflowId, Workflow>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from definitions, rejecting the first invalid one
    pub fn with_workflows(
        workflows: impl IntoIterator<Item = Workflow>,
    ) -> Result<Self, DefinitionError> {
        let store = Self::new();
        for workflow in workflows {
            store.register(workflow)?;
        }
        Ok(store)
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn get(&self, workflow_id: &WorkflowId) -> Option<Workflow> {
        self.workflows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workflow_id)
            .cloned()
    }

    fn list(&self) -> Vec<Workflow> {
        self.workflows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn register(&self, workflow: Workflow) -> Result<(), DefinitionError> {
        workflow.check()?;
        tracing::debug!(workflow_id = %workflow.id, "Registered workflow");
        self.workflows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(workflow.id.clone(), workflow);
        Ok(())
    }
}
