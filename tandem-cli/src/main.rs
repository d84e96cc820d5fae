//! Tandem CLI
//!
//! Runs pipelines from a local manifest and talks to a remote orchestrator.

mod commands;
mod logging;
mod output;

use clap::Parser;
use colored::*;
use commands::{Commands, exit_code, handle_command};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Tandem container-job pipeline CLI", long_about = None)]
struct Cli {
    /// Log level for tandem crates (overridden by RUST_LOG)
    #[arg(long, global = true, env = "TANDEM_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match handle_command(cli.command).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(exit_code(&e))
        }
    }
}
