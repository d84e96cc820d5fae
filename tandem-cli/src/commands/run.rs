//! Local pipeline execution
//!
//! Loads a manifest, resolves configuration from the command line, a secrets
//! directory and the environment, and runs the pipeline in-process against
//! podman (or a simulated backend with `--dry-run`).

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_core::domain::binding::InvocationContext;
use tandem_core::OrchestrationError;
use tandem_orchestrator::PipelineExecutor;
use tandem_orchestrator::secrets::{ChainedSecretProvider, ConfigResolver};
use tandem_orchestrator::tracker::{MemoryRunTracker, RunTracker};
use tandem_runner::backend::{
    ComputeBackend, PodmanBackend, ScriptedBackend, podman::check_podman_available,
};
use tandem_runner::RunnerConfig;
use tokio_util::sync::CancellationToken;

use super::validate::load_manifest;
use super::{Outcome, parse_key_val};
use crate::output;

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline definition to run
    pub definition_id: String,

    /// Path to the Lua manifest declaring jobs and pipelines
    #[arg(short, long, env = "TANDEM_MANIFEST")]
    pub manifest: PathBuf,

    /// Configuration inputs as KEY=value pairs; these win over every provider
    #[arg(short, long, value_parser = parse_key_val)]
    pub config: Vec<(String, String)>,

    /// Directory with one file per configuration key
    #[arg(long, env = "TANDEM_SECRETS_DIR")]
    pub secrets_dir: Option<PathBuf>,

    /// Prefix for configuration read from the environment
    #[arg(long, env = "TANDEM_ENV_PREFIX", default_value = "")]
    pub env_prefix: String,

    /// Containers admitted at once
    #[arg(long, default_value = "4")]
    pub max_tasks: usize,

    /// Resolve configuration and walk the pipeline without starting containers
    #[arg(long)]
    pub dry_run: bool,

    /// Print the audit history after the run
    #[arg(long)]
    pub history: bool,
}

/// Reports a bad runner environment as a configuration error
fn runner_config(loaded: anyhow::Result<RunnerConfig>) -> Result<RunnerConfig> {
    loaded.map_err(|e| {
        OrchestrationError::invalid("runner configuration", format!("{:#}", e)).into()
    })
}

pub async fn run_pipeline(args: RunArgs) -> Result<Outcome> {
    let store = Arc::new(load_manifest(&args.manifest)?);
    let runner_config = runner_config(RunnerConfig::from_env())?;
    if args.max_tasks == 0 {
        return Err(OrchestrationError::invalid(
            "--max-tasks",
            "must be greater than 0",
        )
        .into());
    }

    let backend: Arc<dyn ComputeBackend> = if args.dry_run {
        println!("{}", "Dry run: no containers will be started".yellow());
        Arc::new(ScriptedBackend::new())
    } else {
        check_podman_available().await?;
        Arc::new(PodmanBackend::new(args.max_tasks))
    };

    let provider = ChainedSecretProvider::from_sources(args.secrets_dir.clone(), &args.env_prefix);
    let tracker = Arc::new(MemoryRunTracker::new());
    let executor = PipelineExecutor::new(
        store,
        ConfigResolver::new(Arc::new(provider)),
        backend,
        tracker.clone(),
        runner_config,
    );

    let inputs: BTreeMap<String, String> = args.config.into_iter().collect();
    let context = InvocationContext::new(inputs);
    let invocation_id = context.invocation_id;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, stopping the running step...".yellow());
            on_interrupt.cancel();
        }
    });

    println!(
        "{} {} {}",
        "Running pipeline".bold(),
        args.definition_id.cyan(),
        invocation_id.to_string().dimmed()
    );

    let invocation = executor
        .execute(&args.definition_id, context, cancel)
        .await
        .with_context(|| format!("Failed to start pipeline '{}'", args.definition_id))?;

    println!();
    output::print_invocation(&invocation);

    if args.history {
        println!();
        println!("{}", "History:".bold());
        for event in tracker.history(invocation_id).await? {
            output::print_event(&event);
        }
    }

    Ok(Outcome::from_status(invocation.overall_status))
}
