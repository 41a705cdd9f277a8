use super::context::RunContext;
use super::dag::{ExecutionPlan, ExecutionPlanEntry};
use super::step_executor::StepInvoker;
use crate::config::{ExecutionMode, GatingPolicy};
use crate::types::{ExecutionResult, Step, StepId, Workflow};
use futures::future::join_all;
use std::collections::HashMap;

/// Message recorded for a step whose upstream did not let it run
pub const DEPENDENCIES_NOT_SATISFIED: &str = "Dependencies not satisfied";

/// Ordered result log plus the context the run ended with
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub results: Vec<ExecutionResult>,
    pub context: RunContext,
}

impl RunOutcome {
    /// Ids of completed steps, in the order they were recorded
    pub fn completed_steps(&self) -> Vec<StepId> {
        self.results
            .iter()
            .filter(|r| r.is_completed())
            .map(|r| r.step_id.clone())
            .collect()
    }
}

/// How a step ended, as seen by the steps that depend on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    /// Never invoked because its own dependencies were not satisfied
    Gated,
}

type StepIndex<'a> = HashMap<&'a StepId, &'a Step>;

/// Walks an execution plan level by level
pub struct WorkflowExecutor {
    invoker: StepInvoker,
    mode: ExecutionMode,
    gating: GatingPolicy,
}

impl WorkflowExecutor {
    pub fn new(invoker: StepInvoker, mode: ExecutionMode, gating: GatingPolicy) -> Self {
        Self {
            invoker,
            mode,
            gating,
        }
    }

    /// Execute every planned step; step failures never abort the run
    pub async fn execute(
        &self,
        workflow: &Workflow,
        plan: &ExecutionPlan,
        mut context: RunContext,
    ) -> RunOutcome {
        let steps: StepIndex = workflow.steps.iter().map(|s| (&s.id, s)).collect();
        let mut outcomes: HashMap<StepId, Outcome> = HashMap::new();
        let mut results = Vec::with_capacity(plan.len());

        let mut level_start = 0;
        let entries = plan.entries();
        while level_start < entries.len() {
            let level = entries[level_start].level;
            let level_end = entries[level_start..]
                .iter()
                .position(|e| e.level != level)
                .map_or(entries.len(), |offset| level_start + offset);
            let level_entries = &entries[level_start..level_end];

            tracing::debug!(level, steps = level_entries.len(), "Executing level");

            match self.mode {
                ExecutionMode::Sequential => {
                    for entry in level_entries {
                        let run = self.dependencies_satisfied(&steps, entry, &outcomes);
                        let result = if run {
                            self.invoke(workflow, &steps, entry, &context).await
                        } else {
                            gated(entry)
                        };
                        fold(&mut context, &mut outcomes, &mut results, result, run);
                    }
                }
                ExecutionMode::Concurrent => {
                    // gating only reads earlier levels, so decide it up front
                    let runnable: Vec<bool> = level_entries
                        .iter()
                        .map(|entry| self.dependencies_satisfied(&steps, entry, &outcomes))
                        .collect();

                    let invocations = level_entries
                        .iter()
                        .zip(&runnable)
                        .filter(|(_, run)| **run)
                        .map(|(entry, _)| self.invoke(workflow, &steps, entry, &context));
                    let mut finished = join_all(invocations).await.into_iter();

                    for (entry, run) in level_entries.iter().zip(runnable) {
                        let result = match (run, finished.next()) {
                            (true, Some(result)) => result,
                            _ => gated(entry),
                        };
                        fold(&mut context, &mut outcomes, &mut results, result, run);
                    }
                }
            }

            level_start = level_end;
        }

        RunOutcome { results, context }
    }

    async fn invoke(
        &self,
        workflow: &Workflow,
        steps: &StepIndex<'_>,
        entry: &ExecutionPlanEntry,
        context: &RunContext,
    ) -> ExecutionResult {
        match steps.get(&entry.step_id) {
            Some(step) => self.invoker.invoke(step, context).await,
            None => ExecutionResult::failed(
                entry.step_id.clone(),
                format!("Step {} not found in workflow {}", entry.step_id, workflow.id),
            ),
        }
    }

    fn dependencies_satisfied(
        &self,
        steps: &StepIndex<'_>,
        entry: &ExecutionPlanEntry,
        outcomes: &HashMap<StepId, Outcome>,
    ) -> bool {
        entry.dependencies.iter().all(|dep| match (self.gating, outcomes.get(dep)) {
            (_, None) => false,
            (GatingPolicy::Status, Some(outcome)) => *outcome == Outcome::Completed,
            (GatingPolicy::Branch, Some(Outcome::Gated)) => false,
            (GatingPolicy::Branch, Some(outcome)) => steps.get(dep).is_some_and(|step| {
                let taken = match outcome {
                    Outcome::Completed => step.success_target(),
                    _ => step.failure_target(),
                };
                taken == Some(&entry.step_id)
            }),
        })
    }
}

fn gated(entry: &ExecutionPlanEntry) -> ExecutionResult {
    tracing::warn!(step_id = %entry.step_id, "Skipping step: dependencies not satisfied");
    ExecutionResult::failed(entry.step_id.clone(), DEPENDENCIES_NOT_SATISFIED)
}

/// Apply one finished step to the run state, in declaration order
fn fold(
    context: &mut RunContext,
    outcomes: &mut HashMap<StepId, Outcome>,
    results: &mut Vec<ExecutionResult>,
    result: ExecutionResult,
    invoked: bool,
) {
    let outcome = match (invoked, result.is_completed()) {
        (false, _) => Outcome::Gated,
        (true, true) => Outcome::Completed,
        (true, false) => Outcome::Failed,
    };

    if let Some(output) = &result.output {
        context.record(&result.step_id, output.clone());
    }
    outcomes.insert(result.step_id.clone(), outcome);
    results.push(result);
}
