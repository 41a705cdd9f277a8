// Workflow orchestrator: validate, plan and execute a stored workflow

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::registry::{CapabilityTable, EngineRegistry};
use crate::store::WorkflowStore;
use crate::types::{ExecutionResult, RunId, Workflow, WorkflowId};
use crate::workflow::{
    build_execution_plan, execute_linear, is_linear_chain, validate_workflow_structure,
    ExecutionPlan, RunContext, StepInvoker, ValidationReport, WorkflowExecutor, WorkflowGraph,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// Which path a run took through the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Leveled,
    Linear,
}

/// Aggregated result of one `execute_workflow` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunReport {
    pub run_id: RunId,
    pub workflow_id: WorkflowId,
    /// True iff every recorded step completed
    pub success: bool,
    pub strategy: ExecutionStrategy,
    /// Absent when the linear fallback skipped planning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_plan: Option<ExecutionPlan>,
    pub results: Vec<ExecutionResult>,
    pub final_context: Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl WorkflowRunReport {
    pub fn failed_steps(&self) -> usize {
        self.results.iter().filter(|r| !r.is_completed()).count()
    }
}

/// Runs workflows from a store against explicit capability and engine tables
pub struct Orchestrator {
    store: Arc<dyn WorkflowStore>,
    engines: Arc<EngineRegistry>,
    capabilities: Arc<CapabilityTable>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        engines: Arc<EngineRegistry>,
        capabilities: Arc<CapabilityTable>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            engines,
            capabilities,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn engines(&self) -> &Arc<EngineRegistry> {
        &self.engines
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Structural validation of a definition, without running it
    pub fn validate(&self, workflow: &Workflow) -> ValidationReport {
        validate_workflow_structure(&WorkflowGraph::build(workflow))
    }

    /// Validate and plan a definition, without running it
    pub fn plan(&self, workflow: &Workflow) -> Result<ExecutionPlan, OrchestratorError> {
        workflow.check()?;
        let graph = WorkflowGraph::build(workflow);
        ensure_valid(workflow, &validate_workflow_structure(&graph))?;
        Ok(build_execution_plan(&graph)?)
    }

    /// Look up a stored workflow and run it.
    ///
    /// Only a missing workflow or a structurally unsound definition is an
    /// error; both are reported before any step runs.
    pub async fn execute_workflow(
        &self,
        workflow_id: &WorkflowId,
        input: Value,
    ) -> Result<WorkflowRunReport, OrchestratorError> {
        let workflow =
            self.store
                .get(workflow_id)
                .ok_or_else(|| OrchestratorError::WorkflowNotFound {
                    workflow_id: workflow_id.clone(),
                })?;

        self.run(&workflow, input).await
    }

    /// Run a definition that is not necessarily in the store
    pub async fn run(
        &self,
        workflow: &Workflow,
        input: Value,
    ) -> Result<WorkflowRunReport, OrchestratorError> {
        let run_id = RunId::new();
        let span = tracing::info_span!(
            "workflow_run",
            run_id = %run_id,
            workflow_id = %workflow.id
        );

        self.run_with_id(run_id, workflow, input)
            .instrument(span)
            .await
    }

    async fn run_with_id(
        &self,
        run_id: RunId,
        workflow: &Workflow,
        input: Value,
    ) -> Result<WorkflowRunReport, OrchestratorError> {
        let started_at = Utc::now();
        workflow.check()?;

        let graph = WorkflowGraph::build(workflow);
        ensure_valid(workflow, &validate_workflow_structure(&graph))?;

        let context = RunContext::new(&workflow.initial_state, input);
        let invoker = StepInvoker::new(
            self.capabilities.clone(),
            self.engines.clone(),
            self.config.step_timeout_secs,
        );

        tracing::info!(steps = workflow.steps.len(), "Starting workflow execution");

        let (strategy, execution_plan, outcome) =
            if self.config.linear_fallback && is_linear_chain(workflow) {
                let outcome = execute_linear(&invoker, workflow, context).await;
                (ExecutionStrategy::Linear, None, outcome)
            } else {
                let plan = build_execution_plan(&graph)?;
                tracing::debug!(levels = plan.level_count(), "Planned workflow");
                let executor =
                    WorkflowExecutor::new(invoker, self.config.execution_mode, self.config.gating);
                let outcome = executor.execute(workflow, &plan, context).await;
                (ExecutionStrategy::Leveled, Some(plan), outcome)
            };

        let report = WorkflowRunReport {
            run_id,
            workflow_id: workflow.id.clone(),
            success: outcome.results.iter().all(ExecutionResult::is_completed),
            strategy,
            execution_plan,
            results: outcome.results,
            final_context: outcome.context.into_value(),
            started_at,
            completed_at: Utc::now(),
        };

        tracing::info!(
            success = report.success,
            attempted = report.results.len(),
            failed = report.failed_steps(),
            "Workflow execution finished"
        );

        Ok(report)
    }
}

fn ensure_valid(workflow: &Workflow, report: &ValidationReport) -> Result<(), OrchestratorError> {
    if report.valid {
        return Ok(());
    }

    tracing::warn!(
        workflow_id = %workflow.id,
        errors = report.errors.len(),
        "Workflow failed validation"
    );
    Err(OrchestratorError::ValidationFailed {
        workflow_id: workflow.id.clone(),
        errors: report.errors.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionMode, GatingPolicy};
    use crate::protocol::CallToolResult;
    use crate::registry::{from_fn, CapabilityKind};
    use crate::store::InMemoryWorkflowStore;
    use crate::types::{Step, StepAction, StepId, StepStatus, Transition};
    use crate::workflow::DEPENDENCIES_NOT_SATISFIED;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        orchestrator: Orchestrator,
        calls: Arc<AtomicUsize>,
    }

    fn fixture(workflows: Vec<Workflow>, config: OrchestratorConfig) -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

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
                from_fn(|_| async { Ok(CallToolResult::error("citation check failed")) }),
            )
            .register(
                CapabilityKind::Module,
                "throws",
                from_fn(|_| async { Err(anyhow!("upstream closed the connection")) }),
            )
            .register(
                CapabilityKind::Module,
                "spy",
                from_fn(move |_| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(CallToolResult::text("seen"))
                    }
                }),
            );

        let store = InMemoryWorkflowStore::with_workflows(workflows).unwrap();
        Fixture {
            orchestrator: Orchestrator::new(
                Arc::new(store),
                Arc::new(EngineRegistry::new()),
                Arc::new(table),
                config,
            ),
            calls,
        }
    }

    fn tool(id: &str, target: &str) -> Step {
        Step::new(id, StepAction::Tool { target: target.to_string() })
    }

    fn module(id: &str, target: &str) -> Step {
        Step::new(id, StepAction::Module { target: target.to_string() })
    }

    fn leveled_only() -> OrchestratorConfig {
        OrchestratorConfig {
            linear_fallback: false,
            ..OrchestratorConfig::default()
        }
    }

    fn wid(id: &str) -> WorkflowId {
        WorkflowId::new(id)
    }

    #[tokio::test]
    async fn test_missing_workflow() {
        let fx = fixture(vec![], OrchestratorConfig::default());

        let err = fx
            .orchestrator
            .execute_workflow(&wid("ghost"), json!({}))
            .await
            .unwrap_err();

        assert_eq!(err, OrchestratorError::WorkflowNotFound { workflow_id: wid("ghost") });
    }

    #[tokio::test]
    async fn test_cycle_is_never_executed() {
        let workflow = Workflow::new(
            "loop",
            "Loop",
            vec![
                module("a", "spy").on_success(Transition::next("b")),
                module("b", "spy").on_success(Transition::next("a")),
            ],
        );
        let fx = fixture(vec![workflow], OrchestratorConfig::default());

        let err = fx
            .orchestrator
            .execute_workflow(&wid("loop"), json!({}))
            .await
            .unwrap_err();

        match err {
            OrchestratorError::ValidationFailed { errors, .. } => {
                assert!(errors.iter().all(|e| e.starts_with("Circular dependency")));
                assert!(!errors.is_empty());
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_success_target_surfaces_one_error() {
        let workflow = Workflow::new(
            "typo",
            "Typo",
            vec![
                module("a", "spy").on_success(Transition::next("reveiw")),
                module("review", "spy"),
            ],
        );
        let fx = fixture(vec![workflow.clone()], OrchestratorConfig::default());

        let err = fx.orchestrator.run(&workflow, json!({})).await.unwrap_err();

        assert_eq!(
            err,
            OrchestratorError::ValidationFailed {
                workflow_id: wid("typo"),
                errors: vec![
                    "Step \"a\" references unknown step \"reveiw\" via on_success".to_string()
                ],
            }
        );
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
        assert!(fx.orchestrator.plan(&workflow).is_err());
    }

    #[tokio::test]
    async fn test_invalid_definition_rejected_before_graph_building() {
        let workflow = Workflow::new("dup", "Dup", vec![tool("a", "echo"), tool("a", "echo")]);
        let fx = fixture(vec![], OrchestratorConfig::default());

        let err = fx.orchestrator.run(&workflow, json!({})).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::InvalidDefinition(_)));
    }

    #[tokio::test]
    async fn test_thrown_error_is_local_to_its_step() {
        let workflow = Workflow::new(
            "mixed",
            "Mixed",
            vec![
                module("fetch", "throws").on_success(Transition::next("summarize")),
                module("summarize", "spy"),
                tool("cite", "echo").on_success(Transition::next("format")),
                tool("format", "echo"),
            ],
        );
        let fx = fixture(vec![workflow], leveled_only());

        let report = fx
            .orchestrator
            .execute_workflow(&wid("mixed"), json!({}))
            .await
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.strategy, ExecutionStrategy::Leveled);
        let by_id = |id: &str| {
            report
                .results
                .iter()
                .find(|r| r.step_id.as_str() == id)
                .unwrap()
                .clone()
        };
        assert_eq!(
            by_id("fetch").error.as_deref(),
            Some("upstream closed the connection")
        );
        assert_eq!(by_id("summarize").error.as_deref(), Some(DEPENDENCIES_NOT_SATISFIED));
        assert_eq!(by_id("cite").status, StepStatus::Completed);
        assert_eq!(by_id("format").status, StepStatus::Completed);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.failed_steps(), 2);
    }

    #[tokio::test]
    async fn test_success_and_failure_branch_scenario() {
        // A succeeds; under status gating both B and C depend only on A
        // having completed, so both run at level 1.
        let workflow = Workflow::new(
            "branch",
            "Branch",
            vec![
                tool("a", "echo")
                    .on_success(Transition::next("b"))
                    .on_failure(Transition::next("c")),
                module("b", "spy"),
                module("c", "spy"),
            ],
        );
        let fx = fixture(vec![workflow.clone()], OrchestratorConfig::default());

        let report = fx
            .orchestrator
            .execute_workflow(&wid("branch"), json!({}))
            .await
            .unwrap();

        let plan = report.execution_plan.clone().unwrap();
        let levels = plan.group_by_level();
        assert_eq!(levels[&0], vec![StepId::new("a")]);
        assert_eq!(levels[&1], vec![StepId::new("b"), StepId::new("c")]);
        assert!(report.success);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 2);

        // Branch gating runs only the taken side
        let branch = fixture(
            vec![workflow],
            OrchestratorConfig {
                gating: GatingPolicy::Branch,
                ..OrchestratorConfig::default()
            },
        );
        let report = branch
            .orchestrator
            .execute_workflow(&wid("branch"), json!({}))
            .await
            .unwrap();
        assert_eq!(branch.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.results[2].error.as_deref(), Some(DEPENDENCIES_NOT_SATISFIED));
        assert!(!report.success);
    }

    fn five_step_chain(failing: Option<usize>) -> Workflow {
        let steps = (1..=5)
            .map(|i| {
                let target = if failing == Some(i) { "reject" } else { "echo" };
                let step = tool(&format!("s{}", i), target);
                if i < 5 {
                    step.on_success(Transition::next(format!("s{}", i + 1)))
                } else {
                    step
                }
            })
            .collect();
        Workflow::new("chain", "Chain", steps)
    }

    #[tokio::test]
    async fn test_five_step_chain_plans_five_levels() {
        let fx = fixture(vec![five_step_chain(None)], leveled_only());

        let report = fx
            .orchestrator
            .execute_workflow(&wid("chain"), json!({}))
            .await
            .unwrap();

        let levels = report.execution_plan.unwrap().group_by_level();
        assert_eq!(levels.len(), 5);
        for (level, ids) in &levels {
            assert_eq!(ids, &vec![StepId::new(format!("s{}", level + 1))]);
        }
    }

    #[tokio::test]
    async fn test_linear_fallback_matches_planned_order() {
        for failing in [None, Some(3), Some(1)] {
            let planned = fixture(vec![five_step_chain(failing)], leveled_only());
            let fallback = fixture(vec![five_step_chain(failing)], OrchestratorConfig::default());

            let planned = planned
                .orchestrator
                .execute_workflow(&wid("chain"), json!({}))
                .await
                .unwrap();
            let fallback = fallback
                .orchestrator
                .execute_workflow(&wid("chain"), json!({}))
                .await
                .unwrap();

            assert_eq!(planned.strategy, ExecutionStrategy::Leveled);
            assert_eq!(fallback.strategy, ExecutionStrategy::Linear);
            assert!(fallback.execution_plan.is_none());

            let completed = |report: &WorkflowRunReport| -> Vec<StepId> {
                report
                    .results
                    .iter()
                    .filter(|r| r.is_completed())
                    .map(|r| r.step_id.clone())
                    .collect()
            };
            assert_eq!(completed(&planned), completed(&fallback), "failing {:?}", failing);
            assert_eq!(planned.success, fallback.success);
        }
    }

    #[tokio::test]
    async fn test_context_flows_between_steps() {
        let mut workflow = Workflow::new(
            "flow",
            "Flow",
            vec![
                tool("draft", "echo")
                    .with_input(json!({"title": "{{matter}} memo"}))
                    .on_success(Transition::next("review")),
                tool("review", "echo")
                    .with_input(json!({"draft_title": "{{stepResults.draft.title}}"})),
            ],
        );
        workflow
            .initial_state
            .insert("matter".to_string(), json!("placeholder"));
        let fx = fixture(vec![workflow], OrchestratorConfig::default());

        let report = fx
            .orchestrator
            .execute_workflow(&wid("flow"), json!({"matter": "Acme v. Roe"}))
            .await
            .unwrap();

        assert!(report.success);
        let review = &report.final_context["stepResults"]["review"];
        assert_eq!(review["draft_title"], "Acme v. Roe memo");
        assert_eq!(report.final_context["matter"], "Acme v. Roe");
    }

    #[tokio::test]
    async fn test_concurrent_mode_reports_same_outcome() {
        let workflow = Workflow::new(
            "wide",
            "Wide",
            vec![
                tool("a", "echo").on_success(Transition::next("d")),
                tool("b", "reject").on_success(Transition::next("d")),
                module("c", "spy"),
                module("d", "spy"),
            ],
        );
        let sequential = fixture(vec![workflow.clone()], OrchestratorConfig::default());
        let concurrent = fixture(
            vec![workflow],
            OrchestratorConfig {
                execution_mode: ExecutionMode::Concurrent,
                ..OrchestratorConfig::default()
            },
        );

        let seq = sequential
            .orchestrator
            .execute_workflow(&wid("wide"), json!({}))
            .await
            .unwrap();
        let con = concurrent
            .orchestrator
            .execute_workflow(&wid("wide"), json!({}))
            .await
            .unwrap();

        let shape = |r: &WorkflowRunReport| -> Vec<(StepId, StepStatus)> {
            r.results.iter().map(|x| (x.step_id.clone(), x.status)).collect()
        };
        assert_eq!(shape(&seq), shape(&con));
        assert_eq!(concurrent.calls.load(Ordering::SeqCst), 1);
        assert_ne!(seq.run_id, con.run_id);
    }
}
