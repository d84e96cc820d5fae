//! Manifest validation

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::path::{Path, PathBuf};
use tandem_core::OrchestrationError;
use tandem_orchestrator::DescriptorStore;

use super::Outcome;

#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the Lua manifest
    #[arg(short, long, env = "TANDEM_MANIFEST")]
    pub manifest: PathBuf,
}

pub fn validate(args: ValidateArgs) -> Result<Outcome> {
    let store = load_manifest(&args.manifest)?;

    println!(
        "{} {}",
        "✓ Manifest is valid:".green(),
        args.manifest.display()
    );

    let descriptors = store.list();
    println!();
    println!("{}", format!("Jobs ({}):", descriptors.len()).bold());
    for descriptor in &descriptors {
        println!(
            "  {} {} {}",
            "▸".cyan(),
            descriptor.id.bold(),
            descriptor.container_image.dimmed()
        );
        if !descriptor.required_config_keys.is_empty() {
            let keys: Vec<&str> = descriptor
                .required_config_keys
                .iter()
                .map(String::as_str)
                .collect();
            println!("    requires: {}", keys.join(", ").dimmed());
        }
    }

    let pipelines = store.list_pipelines();
    println!();
    println!("{}", format!("Pipelines ({}):", pipelines.len()).bold());
    for pipeline in &pipelines {
        println!(
            "  {} {} {}",
            "▸".cyan(),
            pipeline.id.bold(),
            pipeline.steps.join(" → ").dimmed()
        );
    }

    Ok(Outcome::Success)
}

/// Parses a manifest and registers it into a fresh store
///
/// Parse failures are reported as invalid definitions so they share the
/// validation exit code.
pub(super) fn load_manifest(path: &Path) -> Result<DescriptorStore> {
    let manifest = tandem_lua::parse_manifest_file(path)
        .map_err(|e| OrchestrationError::invalid(path.display().to_string(), format!("{:#}", e)))?;

    let store = DescriptorStore::new();
    let (jobs, pipelines) = store
        .load_manifest(manifest)
        .with_context(|| format!("Failed to load manifest {}", path.display()))?;
    tracing::info!(
        "Loaded {} job(s) and {} pipeline(s) from {}",
        jobs,
        pipelines,
        path.display()
    );

    Ok(store)
}
