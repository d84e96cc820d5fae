//! Remote invocation commands
//!
//! Thin wrappers over the orchestrator HTTP API.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use std::collections::BTreeMap;
use std::time::Duration;
use tandem_client::OrchestratorClient;
use tandem_core::domain::run::RunStatus;
use uuid::Uuid;

use super::{Outcome, parse_key_val};
use crate::output;

/// Remote subcommands
#[derive(Subcommand)]
pub enum RemoteCommands {
    /// Start an invocation of a registered pipeline
    Start {
        /// Pipeline definition to run
        definition_id: String,

        /// Configuration inputs as KEY=value pairs
        #[arg(short, long, value_parser = parse_key_val)]
        config: Vec<(String, String)>,

        /// Wait for the invocation to finish and exit with its status
        #[arg(short, long)]
        wait: bool,

        /// Seconds between status checks while waiting
        #[arg(long, default_value = "2")]
        interval: u64,
    },
    /// Show an invocation
    Get { id: Uuid },
    /// Show the audit history of an invocation
    History { id: Uuid },
    /// Cancel a running invocation
    Cancel { id: Uuid },
    /// List invocations, newest first
    List {
        /// Only show invocations with this status (Pending, Running, Succeeded, Failed)
        #[arg(long)]
        status: Option<RunStatus>,
    },
}

pub async fn handle_remote_command(command: RemoteCommands, url: &str) -> Result<Outcome> {
    let client = OrchestratorClient::new(url);

    match command {
        RemoteCommands::Start {
            definition_id,
            config,
            wait,
            interval,
        } => start(&client, &definition_id, config, wait, interval).await,
        RemoteCommands::Get { id } => get(&client, id).await,
        RemoteCommands::History { id } => history(&client, id).await,
        RemoteCommands::Cancel { id } => cancel(&client, id).await,
        RemoteCommands::List { status } => list(&client, status).await,
    }
}

async fn start(
    client: &OrchestratorClient,
    definition_id: &str,
    config: Vec<(String, String)>,
    wait: bool,
    interval: u64,
) -> Result<Outcome> {
    let config: BTreeMap<String, String> = config.into_iter().collect();
    let accepted = client
        .start_invocation(definition_id, config)
        .await
        .with_context(|| format!("Failed to start pipeline '{}'", definition_id))?;

    println!("{}", "✓ Invocation accepted".green());
    println!("  ID: {}", accepted.invocation_id.to_string().cyan());

    if !wait {
        return Ok(Outcome::Success);
    }

    let interval = Duration::from_secs(interval.max(1));
    loop {
        let invocation = client.get_invocation(accepted.invocation_id).await?;
        if invocation.overall_status.is_terminal() {
            println!();
            output::print_invocation(&invocation);
            return Ok(Outcome::from_status(invocation.overall_status));
        }
        tokio::time::sleep(interval).await;
    }
}

async fn get(client: &OrchestratorClient, id: Uuid) -> Result<Outcome> {
    let invocation = client.get_invocation(id).await?;

    output::print_invocation(&invocation);

    Ok(Outcome::Success)
}

async fn history(client: &OrchestratorClient, id: Uuid) -> Result<Outcome> {
    let events = client.history(id).await?;

    println!("{}", format!("History of invocation {}:", id).bold());
    println!("{}", "─".repeat(80).dimmed());
    for event in &events {
        output::print_event(event);
    }
    println!("{}", "─".repeat(80).dimmed());

    Ok(Outcome::Success)
}

async fn cancel(client: &OrchestratorClient, id: Uuid) -> Result<Outcome> {
    client
        .cancel(id)
        .await
        .with_context(|| format!("Failed to cancel invocation {}", id))?;

    println!("{} {}", "✓ Cancellation requested for".green(), id);

    Ok(Outcome::Success)
}

async fn list(client: &OrchestratorClient, status: Option<RunStatus>) -> Result<Outcome> {
    let summaries: Vec<_> = client
        .list_invocations()
        .await?
        .into_iter()
        .filter(|s| status.is_none_or(|status| s.overall_status == status))
        .collect();

    if summaries.is_empty() {
        println!("{}", "No invocations found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} invocation(s):", summaries.len()).bold()
        );
        println!();
        for summary in &summaries {
            output::print_summary(summary);
        }
    }

    Ok(Outcome::Success)
}
