// Exposes an orchestrator as a named engine other orchestrators can delegate to

use crate::orchestrator::Orchestrator;
use crate::protocol::{CallToolResult, ToolContent};
use crate::registry::Engine;
use crate::types::{Workflow, WorkflowId};
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Requests accepted by [`WorkflowEngine::execute`]
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EngineRequest {
    ExecuteWorkflow {
        #[serde(default)]
        workflow_id: Option<WorkflowId>,
        #[serde(default)]
        input: Value,
    },
    ListWorkflows,
    GetStatus,
    CreateWorkflow {
        workflow: Workflow,
    },
}

pub struct WorkflowEngine {
    name: String,
    orchestrator: Arc<Orchestrator>,
}

impl WorkflowEngine {
    pub fn new(name: impl Into<String>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            name: name.into(),
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    fn list_workflows(&self) -> CallToolResult {
        let workflows: Vec<Value> = self
            .orchestrator
            .store()
            .list()
            .iter()
            .map(|w| {
                json!({
                    "id": w.id,
                    "name": w.name,
                    "description": w.description,
                    "steps": w.steps.len(),
                })
            })
            .collect();

        CallToolResult::json(json!({ "workflows": workflows }))
    }

    fn status(&self) -> CallToolResult {
        CallToolResult::json(json!({
            "engine": self.name,
            "status": "ready",
            "workflows": self.orchestrator.store().list().len(),
            "engines": self.orchestrator.engines().names(),
            "config": self.orchestrator.config(),
        }))
    }

    fn create_workflow(&self, workflow: Workflow) -> CallToolResult {
        let report = self.orchestrator.validate(&workflow);
        if !report.valid {
            return CallToolResult::error(format!(
                "Workflow {} is invalid: {}",
                workflow.id,
                report.errors.join("; ")
            ));
        }

        let workflow_id = workflow.id.clone();
        match self.orchestrator.store().register(workflow) {
            Ok(()) => CallToolResult::json(json!({
                "created": workflow_id,
                "warnings": report.warnings,
            })),
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl Engine for WorkflowEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Value) -> Result<CallToolResult> {
        let request: EngineRequest = match serde_json::from_value(input) {
            Ok(request) => request,
            Err(e) => {
                return Ok(CallToolResult::error(format!(
                    "Invalid request for engine {}: {}",
                    self.name, e
                )))
            }
        };

        match request {
            EngineRequest::ExecuteWorkflow {
                workflow_id: Some(workflow_id),
                input,
            } => self.execute_workflow(&workflow_id, input).await,
            EngineRequest::ExecuteWorkflow {
                workflow_id: None, ..
            } => Ok(CallToolResult::error(
                "workflow_id is required for execute_workflow action",
            )),
            EngineRequest::ListWorkflows => Ok(self.list_workflows()),
            EngineRequest::GetStatus => Ok(self.status()),
            EngineRequest::CreateWorkflow { workflow } => Ok(self.create_workflow(workflow)),
        }
    }

    fn get_workflow(&self, workflow_id: &WorkflowId) -> Option<Workflow> {
        self.orchestrator.store().get(workflow_id)
    }

    /// Each delegated run builds its own context from `input`
    async fn execute_workflow(
        &self,
        workflow_id: &WorkflowId,
        input: Value,
    ) -> Result<CallToolResult> {
        tracing::info!(engine = %self.name, workflow_id = %workflow_id, "Delegated workflow run");

        let report = match self.orchestrator.execute_workflow(workflow_id, input).await {
            Ok(report) => report,
            Err(e) => return Ok(CallToolResult::error(e.to_string())),
        };

        let value = serde_json::to_value(&report)?;
        if report.success {
            return Ok(CallToolResult::json(value));
        }

        Ok(CallToolResult {
            content: vec![
                ToolContent::text(format!(
                    "Workflow {} finished with {} failed step(s)",
                    workflow_id,
                    report.failed_steps()
                )),
                ToolContent::Json { value },
            ],
            is_error: Some(true),
        })
    }
}
