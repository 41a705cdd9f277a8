// Declaration-order fallback for short straight chains

use super::context::RunContext;
use super::executor::RunOutcome;
use super::step_executor::StepInvoker;
use crate::types::{StepId, Workflow};
use std::collections::HashSet;

pub const LINEAR_FALLBACK_MAX_STEPS: usize = 5;

/// Whether a workflow may skip planning and run in declaration order.
///
/// Each step's `on_success` must name the next declared step, the last step
/// has no success target and no step has a failure target.
pub fn is_linear_chain(workflow: &Workflow) -> bool {
    let steps = &workflow.steps;
    if steps.is_empty() || steps.len() > LINEAR_FALLBACK_MAX_STEPS {
        return false;
    }
    if steps.iter().any(|s| s.failure_target().is_some()) {
        return false;
    }

    steps.iter().enumerate().all(|(i, step)| {
        let expected = steps.get(i + 1).map(|next| &next.id);
        step.success_target() == expected
    })
}

/// Run steps one at a time from the first declared step, following
/// `on_success` after a success and `on_failure` after a failure.
pub async fn execute_linear(
    invoker: &StepInvoker,
    workflow: &Workflow,
    mut context: RunContext,
) -> RunOutcome {
    let mut results = Vec::with_capacity(workflow.steps.len());
    let mut visited: HashSet<StepId> = HashSet::new();
    let mut current = workflow.steps.first();

    while let Some(step) = current {
        if !visited.insert(step.id.clone()) {
            tracing::warn!(step_id = %step.id, "Step revisited, stopping linear run");
            break;
        }

        let result = invoker.invoke(step, &context).await;
        if let Some(output) = &result.output {
            context.record(&step.id, output.clone());
        }

        let next = if result.is_completed() {
            step.success_target()
        } else {
            step.failure_target()
        };
        results.push(result);
        current = next.and_then(|id| workflow.step(id));
    }

    RunOutcome { results, context }
}
