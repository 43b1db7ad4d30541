//! `workflow-orchestrator` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — check a workflow definition JSON file.
//! - `run`      — execute a workflow definition once and print the result.
//! - `show`     — print a recorded execution and its step logs.
//! - `migrate`  — run pending database migrations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use capabilities::{CapabilityInvoker, CapabilityRegistry, HttpInvoker};
use engine::{
    EngineConfig, ExecutionStatus, NoopSink, PersistenceSink, PgSink, WorkflowDefinition, WorkflowExecutor,
};

#[derive(Parser)]
#[command(
    name = "workflow-orchestrator",
    about = "Validate and run graph-shaped workflows against capability providers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Execute a workflow definition once and print the execution result as JSON.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Initial input (JSON).
        #[arg(long, default_value = "{}")]
        input: String,
        /// Tenant the run belongs to.
        #[arg(long, env = "ORCHESTRATOR_TENANT", default_value = "local")]
        tenant: String,
        /// Base URL of the capability provider gateway. Without it the
        /// built-in in-process capabilities (`echo`) are used.
        #[arg(long, env = "CAPABILITY_PROVIDER_URL")]
        provider_url: Option<String>,
        /// Bearer token sent to the provider gateway.
        #[arg(long, env = "CAPABILITY_PROVIDER_KEY", hide_env_values = true)]
        provider_key: Option<String>,
        /// Engine configuration file (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Per-run overrides (JSON object), e.g. '{"max_retries": 2}'.
        #[arg(long, default_value = "{}")]
        overrides: String,
        /// Record the execution and its step logs in Postgres.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        /// Workflow id to record the run under (random if omitted).
        #[arg(long)]
        workflow_id: Option<Uuid>,
    },
    /// Print a recorded execution and its step logs as JSON.
    Show {
        execution_id: Uuid,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

fn load_definition(path: &Path) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    EngineConfig::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
}

fn parse_object(raw: &str, what: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).with_context(|| format!("{what} is not valid JSON"))? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("{what} must be a JSON object, got {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let definition = load_definition(&path)?;
            let report = engine::validate(&definition);

            if report.valid {
                println!("✅ Workflow is valid.");
                if !engine::is_acyclic(&definition) {
                    println!("⚠️  The graph contains a cycle; runs are bounded by max_steps.");
                }
            } else {
                for message in report.messages() {
                    eprintln!("❌ {message}");
                }
                std::process::exit(1);
            }
        }
        Command::Run {
            path,
            input,
            tenant,
            provider_url,
            provider_key,
            config,
            overrides,
            database_url,
            workflow_id,
        } => {
            let definition = load_definition(&path)?;
            let engine_config = load_config(config.as_deref())?;
            let input: Value = serde_json::from_str(&input).context("--input is not valid JSON")?;
            let overrides = parse_object(&overrides, "--overrides")?;

            let invoker: Arc<dyn CapabilityInvoker> = match provider_url {
                Some(url) => {
                    info!("Using capability provider at {url}");
                    Arc::new(HttpInvoker::new(&url, provider_key.as_deref()))
                }
                None => {
                    warn!("No provider URL set; using built-in capabilities only");
                    Arc::new(CapabilityRegistry::with_builtins())
                }
            };

            let sink: Arc<dyn PersistenceSink> = match database_url {
                Some(url) => {
                    let pool = db::pool::create_pool(&url, 2)
                        .await
                        .context("failed to connect to database")?;
                    Arc::new(PgSink::new(pool))
                }
                None => Arc::new(NoopSink),
            };

            let executor = WorkflowExecutor::new(invoker)
                .with_sink(sink)
                .with_config(engine_config);

            let execution_id = Uuid::new_v4();
            let result = executor
                .execute(
                    &definition,
                    &tenant,
                    workflow_id.unwrap_or_else(Uuid::new_v4),
                    execution_id,
                    input,
                    &overrides,
                )
                .await;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.status != ExecutionStatus::Completed {
                std::process::exit(1);
            }
        }
        Command::Show {
            execution_id,
            database_url,
        } => {
            let pool = db::pool::create_pool(&database_url, 1)
                .await
                .context("failed to connect to database")?;
            let execution = db::repository::executions::get_execution(&pool, execution_id)
                .await
                .with_context(|| format!("loading execution {execution_id}"))?;
            let step_logs = db::repository::executions::list_step_logs(&pool, execution_id)
                .await
                .with_context(|| format!("loading step logs of {execution_id}"))?;

            let report = serde_json::json!({ "execution": execution, "step_logs": step_logs });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Migrate { database_url } => {
            info!("Running migrations");
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
    }

    Ok(())
}
