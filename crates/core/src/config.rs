use serde::{Deserialize, Serialize};

/// How steps within one level are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One step at a time, in declaration order
    #[default]
    Sequential,
    /// One task per step, joined before the next level starts
    Concurrent,
}

/// When a step's dependencies count as satisfied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatingPolicy {
    /// Every dependency must have completed
    #[default]
    Status,
    /// A dependency counts only through the edge matching its outcome
    Branch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-invocation bound; `None` waits indefinitely
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    #[serde(default)]
    pub gating: GatingPolicy,

    /// Run short straight chains in declaration order without planning
    #[serde(default = "default_linear_fallback")]
    pub linear_fallback: bool,
}

fn default_linear_fallback() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: None,
            execution_mode: ExecutionMode::default(),
            gating: GatingPolicy::default(),
            linear_fallback: default_linear_fallback(),
        }
    }
}
