use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use stepwise_core::{
    EngineRegistry, InMemoryWorkflowStore, Orchestrator, OrchestratorError, WorkflowStore,
};

mod builtins;
mod config;
mod definition;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "stepwise")]
#[command(about = "Validate, plan and run branching step workflows", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "stepwise.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, env = "STEPWISE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a workflow's structure
    Validate { file: PathBuf },

    /// Print the leveled execution plan
    Plan { file: PathBuf },

    /// Execute a workflow with the built-in capabilities
    Run {
        file: PathBuf,

        /// JSON merged over the workflow's initial state
        #[arg(long)]
        input: Option<String>,
    },
}

/// Structural or definition failure
const EXIT_INVALID: u8 = 1;
/// The run finished but some steps failed
const EXIT_FAILED_STEPS: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stepwise=info".into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match args.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let config = CliConfig::load(&args.config)?;
    let code = dispatch(args.command, config).await?;
    Ok(ExitCode::from(code))
}

/// Run one subcommand and return its process exit code
async fn dispatch(command: Command, config: CliConfig) -> Result<u8> {
    let file = match &command {
        Command::Validate { file } | Command::Plan { file } | Command::Run { file, .. } => file,
    };
    let workflow = definition::load_workflow(file)?;

    let store = Arc::new(InMemoryWorkflowStore::new());
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(EngineRegistry::new()),
        Arc::new(builtins::capability_table()),
        config.orchestrator,
    );

    match command {
        Command::Validate { .. } => {
            if let Err(e) = workflow.check() {
                print_json(&json!({ "valid": false, "errors": [e.to_string()] }))?;
                return Ok(EXIT_INVALID);
            }
            let report = orchestrator.validate(&workflow);
            print_json(&report)?;
            Ok(if report.valid { 0 } else { EXIT_INVALID })
        }
        Command::Plan { .. } => match orchestrator.plan(&workflow) {
            Ok(plan) => {
                print_json(&json!({
                    "workflow_id": workflow.id,
                    "levels": plan.group_by_level(),
                    "entries": plan,
                }))?;
                Ok(0)
            }
            Err(e) => report_failure(e),
        },
        Command::Run { input, .. } => {
            let input: Value = match input {
                Some(raw) => serde_json::from_str(&raw).context("--input is not valid JSON")?,
                None => Value::Null,
            };

            let workflow_id = workflow.id.clone();
            if let Err(e) = store.register(workflow) {
                return report_failure(e.into());
            }

            match orchestrator.execute_workflow(&workflow_id, input).await {
                Ok(report) => {
                    print_json(&report)?;
                    Ok(if report.success { 0 } else { EXIT_FAILED_STEPS })
                }
                Err(e) => report_failure(e),
            }
        }
    }
}

fn report_failure(error: OrchestratorError) -> Result<u8> {
    tracing::error!("{}", error);
    let errors = match &error {
        OrchestratorError::ValidationFailed { errors, .. } => errors.clone(),
        other => vec![other.to_string()],
    };
    print_json(&json!({ "valid": false, "errors": errors }))?;
    Ok(EXIT_INVALID)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}
