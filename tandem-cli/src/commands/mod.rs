//! Commands module
//!
//! Defines all CLI commands, their handlers and the exit-code contract:
//! 0 when everything succeeded, 1 when a step failed (or any other runtime
//! error), 2 for configuration and validation errors.

mod remote;
mod run;
mod validate;

pub use remote::RemoteCommands;
pub use run::RunArgs;
pub use validate::ValidateArgs;

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;
use tandem_client::ClientError;
use tandem_core::OrchestrationError;
use tandem_core::domain::run::RunStatus;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline locally from a manifest
    RunPipeline(RunArgs),
    /// Check a manifest without running anything
    Validate(ValidateArgs),
    /// Work with a running orchestrator
    Remote {
        /// Orchestrator URL
        #[arg(
            long,
            env = "TANDEM_ORCHESTRATOR_URL",
            default_value = "http://localhost:8080"
        )]
        orchestrator_url: String,

        #[command(subcommand)]
        command: RemoteCommands,
    },
}

/// How a successfully executed command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The command worked but the pipeline it ran or inspected failed
    StepFailed,
}

impl Outcome {
    pub fn code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::StepFailed => 1,
        }
    }

    pub fn from_status(status: RunStatus) -> Self {
        if status == RunStatus::Failed {
            Outcome::StepFailed
        } else {
            Outcome::Success
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome.code())
    }
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands) -> Result<Outcome> {
    match command {
        Commands::RunPipeline(args) => run::run_pipeline(args).await,
        Commands::Validate(args) => validate::validate(args),
        Commands::Remote {
            orchestrator_url,
            command,
        } => remote::handle_remote_command(command, &orchestrator_url).await,
    }
}

/// Exit code for a command error
///
/// Walks the error chain looking for a typed cause; anything that is not a
/// configuration or validation problem exits with 1.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let is_validation = err.chain().any(|cause| {
        if let Some(e) = cause.downcast_ref::<OrchestrationError>() {
            return e.is_validation_error();
        }
        if let Some(e) = cause.downcast_ref::<ClientError>() {
            return e.is_client_error();
        }
        false
    });

    if is_validation { 2 } else { 1 }
}

/// Parse a single KEY=value pair
pub fn parse_key_val(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    if key.is_empty() {
        anyhow::bail!("invalid KEY=value: empty key in `{}`", s);
    }
    Ok((key.to_string(), value.to_string()))
}
