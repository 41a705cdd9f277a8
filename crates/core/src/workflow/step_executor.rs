use super::context::RunContext;
use crate::protocol::CallToolResult;
use crate::registry::{Capability, CapabilityKind, CapabilityTable, Engine, EngineRegistry};
use crate::template::TemplateProcessor;
use crate::types::{ExecutionResult, Step, StepAction, StepId, WorkflowId};
use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Resolved target of one invocation
enum Call {
    Capability(Arc<dyn Capability>),
    Engine {
        engine: Arc<dyn Engine>,
        workflow: Option<WorkflowId>,
    },
}

impl Call {
    async fn invoke(self, input: Value) -> Result<CallToolResult> {
        match self {
            Self::Capability(capability) => capability.invoke(input).await,
            Self::Engine {
                engine,
                workflow: Some(workflow_id),
            } => engine.execute_workflow(&workflow_id, input).await,
            Self::Engine {
                engine,
                workflow: None,
            } => engine.execute(input).await,
        }
    }
}

/// Dispatches a step to a local capability or a delegated engine.
///
/// Each invocation runs in its own task under the optional timeout, so an
/// error, a panic or a hang all come back as a `failed` result.
#[derive(Clone)]
pub struct StepInvoker {
    capabilities: Arc<CapabilityTable>,
    engines: Arc<EngineRegistry>,
    timeout_secs: Option<u64>,
}

impl StepInvoker {
    pub fn new(
        capabilities: Arc<CapabilityTable>,
        engines: Arc<EngineRegistry>,
        timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            capabilities,
            engines,
            timeout_secs,
        }
    }

    /// Resolve the step's placeholders, merge its input over the context
    /// and invoke its target.
    pub async fn invoke(&self, step: &Step, context: &RunContext) -> ExecutionResult {
        let resolved = TemplateProcessor::resolve(&step.input, context);
        let input = context.merged_with(&resolved);
        self.dispatch(&step.id, &step.action, input).await
    }

    /// Invoke an action with an already merged input
    pub async fn dispatch(&self, step_id: &StepId, action: &StepAction, input: Value) -> ExecutionResult {
        let started_at = Utc::now();

        let call = match self.lookup(action) {
            Ok(call) => call,
            Err(message) => {
                tracing::warn!(step_id = %step_id, "{}", message);
                return ExecutionResult::failed(step_id.clone(), message)
                    .timed(started_at, Utc::now());
            }
        };

        tracing::info!(
            step_id = %step_id,
            kind = action.kind_name(),
            target = action.target(),
            "Executing step"
        );

        let timeout_secs = self.timeout_secs;
        let handle = tokio::spawn(async move {
            match timeout_secs {
                Some(secs) => match timeout(Duration::from_secs(secs), call.invoke(input)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("Step timed out after {} seconds", secs)),
                },
                None => call.invoke(input).await,
            }
        });

        let result = match handle.await {
            Ok(Ok(call_result)) if call_result.is_error() => {
                let mut failed =
                    ExecutionResult::failed(step_id.clone(), call_result.error_message());
                failed.output = Some(call_result.output_value());
                failed
            }
            Ok(Ok(call_result)) => {
                ExecutionResult::completed(step_id.clone(), call_result.output_value())
            }
            Ok(Err(e)) => ExecutionResult::failed(step_id.clone(), e.to_string()),
            Err(e) if e.is_panic() => ExecutionResult::failed(
                step_id.clone(),
                format!("Step panicked: {}", panic_message(e.into_panic())),
            ),
            Err(e) => ExecutionResult::failed(step_id.clone(), format!("Step was cancelled: {}", e)),
        };

        if let Some(error) = &result.error {
            tracing::warn!(step_id = %step_id, error = %error, "Step failed");
        }

        result.timed(started_at, Utc::now())
    }

    fn lookup(&self, action: &StepAction) -> Result<Call, String> {
        let kind = match action {
            StepAction::Engine { engine, workflow } => {
                return self
                    .engines
                    .get(engine)
                    .map(|found| Call::Engine {
                        engine: found,
                        workflow: workflow.clone(),
                    })
                    .ok_or_else(|| format!("Engine {} not found", engine));
            }
            StepAction::Tool { .. } => CapabilityKind::Tool,
            StepAction::Module { .. } => CapabilityKind::Module,
            StepAction::Ai { .. } => CapabilityKind::Ai,
        };

        let target = action.target();
        self.capabilities
            .get(kind, target)
            .map(Call::Capability)
            .ok_or_else(|| format!("{} {} not found", kind, target))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::from_fn;
    use crate::types::{StepStatus, Workflow};
    use serde_json::{json, Map};

    async fn explode(_input: Value) -> Result<CallToolResult> {
        panic!("index out of range")
    }

    fn invoker(timeout_secs: Option<u64>) -> StepInvoker {
        let mut table = CapabilityTable::new();
        table
            .register(
                CapabilityKind::Tool,
                "echo",
                from_fn(|input| async move { Ok(CallToolResult::json(input)) }),
            )
            .register(
                CapabilityKind::Tool,
                "reject",
                from_fn(|_| async { Ok(CallToolResult::error("quota exceeded")) }),
            )
            .register(
                CapabilityKind::Module,
                "throws",
                from_fn(|_| async { Err(anyhow!("connection reset")) }),
            )
            .register(
                CapabilityKind::Module,
                "panics",
                from_fn(explode),
            )
            .register(
                CapabilityKind::Ai,
                "slow",
                from_fn(|_| async {
                    tokio::time::sleep(Duration::from_secs(600)).await;
                    Ok(CallToolResult::text("late"))
                }),
            );

        StepInvoker::new(Arc::new(table), Arc::new(EngineRegistry::new()), timeout_secs)
    }

    fn step(id: &str, action: StepAction) -> Step {
        Step::new(id, action)
    }

    fn tool(target: &str) -> StepAction {
        StepAction::Tool { target: target.to_string() }
    }

    fn module(target: &str) -> StepAction {
        StepAction::Module { target: target.to_string() }
    }

    #[tokio::test]
    async fn test_step_input_resolved_and_merged_over_context() {
        let mut context = RunContext::new(&Map::new(), json!({"client": "Acme", "mode": "draft"}));
        context.record(&StepId::new("fetch"), json!({"pages": 4}));

        let step = step("summarize", tool("echo"))
            .with_input(json!({"mode": "final", "pages": "{{stepResults.fetch.pages}}"}));
        let result = invoker(None).invoke(&step, &context).await;

        assert_eq!(result.status, StepStatus::Completed);
        let output = result.output.unwrap();
        assert_eq!(output["mode"], "final");
        assert_eq!(output["client"], "Acme");
        assert_eq!(output["pages"], 4);
        assert!(result.started_at.is_some() && result.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_error_flag_and_thrown_error_fail_the_step() {
        let context = RunContext::default();

        let flagged = invoker(None).invoke(&step("a", tool("reject")), &context).await;
        assert_eq!(flagged.status, StepStatus::Failed);
        assert_eq!(flagged.error.as_deref(), Some("quota exceeded"));
        assert_eq!(flagged.output, Some(json!("quota exceeded")));

        let thrown = invoker(None).invoke(&step("b", module("throws")), &context).await;
        assert_eq!(thrown.status, StepStatus::Failed);
        assert_eq!(thrown.error.as_deref(), Some("connection reset"));
        assert!(thrown.output.is_none());
    }

    #[tokio::test]
    async fn test_lookup_misses_name_the_target() {
        let context = RunContext::default();
        let invoker = invoker(None);

        let tool_miss = invoker.invoke(&step("a", tool("missing")), &context).await;
        assert_eq!(tool_miss.error.as_deref(), Some("Tool missing not found"));

        // registered as a tool, not as a module
        let wrong_kind = invoker.invoke(&step("b", module("echo")), &context).await;
        assert_eq!(wrong_kind.error.as_deref(), Some("Module echo not found"));

        let engine_miss = invoker
            .invoke(
                &step(
                    "c",
                    StepAction::Engine {
                        engine: "forecast".to_string(),
                        workflow: None,
                    },
                ),
                &context,
            )
            .await;
        assert_eq!(engine_miss.status, StepStatus::Failed);
        assert_eq!(engine_miss.error.as_deref(), Some("Engine forecast not found"));
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_result() {
        let result = invoker(None)
            .invoke(&step("a", module("panics")), &RunContext::default())
            .await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(
            result.error.as_deref(),
            Some("Step panicked: index out of range")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_failed_result() {
        let action = StepAction::Ai { provider: "slow".to_string() };
        let result = invoker(Some(2))
            .invoke(&step("a", action), &RunContext::default())
            .await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("Step timed out after 2 seconds"));
    }

    #[tokio::test]
    async fn test_engine_delegation_routes_by_workflow() {
        struct Recorder;

        #[async_trait::async_trait]
        impl Engine for Recorder {
            fn name(&self) -> &str {
                "recorder"
            }

            async fn execute(&self, input: Value) -> Result<CallToolResult> {
                Ok(CallToolResult::json(json!({"via": "execute", "input": input})))
            }

            fn get_workflow(&self, _workflow_id: &WorkflowId) -> Option<Workflow> {
                None
            }

            async fn execute_workflow(
                &self,
                workflow_id: &WorkflowId,
                _input: Value,
            ) -> Result<CallToolResult> {
                Ok(CallToolResult::json(json!({"via": workflow_id.as_str()})))
            }
        }

        let engines = EngineRegistry::new();
        engines.register(Arc::new(Recorder));
        let invoker = StepInvoker::new(Arc::new(CapabilityTable::new()), Arc::new(engines), None);
        let context = RunContext::new(&Map::new(), json!({"matter": 9}));

        let direct = invoker
            .invoke(
                &step(
                    "a",
                    StepAction::Engine {
                        engine: "recorder".to_string(),
                        workflow: None,
                    },
                ),
                &context,
            )
            .await;
        let output = direct.output.unwrap();
        assert_eq!(output["via"], "execute");
        assert_eq!(output["input"]["matter"], 9);

        let routed = invoker
            .invoke(
                &step(
                    "b",
                    StepAction::Engine {
                        engine: "recorder".to_string(),
                        workflow: Some(WorkflowId::new("intake")),
                    },
                ),
                &context,
            )
            .await;
        assert_eq!(routed.output.unwrap()["via"], "intake");
    }
}
