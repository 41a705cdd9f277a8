use anyhow::{Context, Result};
use std::path::Path;
use stepwise_core::Workflow;

/// Load one workflow definition; `.toml` files are TOML, anything else JSON
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;

    let workflow: Workflow = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content).context("Failed to parse TOML workflow")?,
        _ => serde_json::from_str(&content).context("Failed to parse JSON workflow")?,
    };

    tracing::debug!(workflow_id = %workflow.id, steps = workflow.steps.len(), "Loaded workflow");
    Ok(workflow)
}
