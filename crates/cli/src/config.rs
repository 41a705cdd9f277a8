use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use stepwise_core::OrchestratorConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl CliConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        if !config_path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read configuration file {}", config_path.display()))?;
        toml::from_str(&content).context("Failed to parse configuration file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use stepwise_core::{ExecutionMode, GatingPolicy};

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(&dir.path().join("stepwise.toml")).unwrap();

        assert_eq!(config, CliConfig::default());
        assert!(config.orchestrator.linear_fallback);
    }

    #[test]
    fn test_load_orchestrator_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[orchestrator]
step_timeout_secs = 45
execution_mode = "concurrent"
gating = "branch"
linear_fallback = false
"#
        )
        .unwrap();

        let config = CliConfig::load(file.path()).unwrap();

        assert_eq!(config.orchestrator.step_timeout_secs, Some(45));
        assert_eq!(config.orchestrator.execution_mode, ExecutionMode::Concurrent);
        assert_eq!(config.orchestrator.gating, GatingPolicy::Branch);
        assert!(!config.orchestrator.linear_fallback);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\nexecution_mode = \"sideways\"").unwrap();

        let err = CliConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
