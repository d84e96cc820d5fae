//! Manifest parser
//!
//! Evaluates a Lua manifest in the sandbox and extracts job descriptors and
//! pipeline definitions. Structural problems (missing fields, wrong types)
//! are reported here; semantic validation such as unknown step references
//! happens when the manifest is loaded into the descriptor store.

use anyhow::{Context, Result};
use mlua::{Table, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tandem_core::domain::descriptor::{
    DEFAULT_CPU_UNITS, DEFAULT_MEMORY_MB, JobDescriptor, RetryPolicy,
};
use tandem_core::domain::pipeline::PipelineDefinition;

use crate::sandbox::create_sandbox;

/// Everything declared by one manifest file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub jobs: Vec<JobDescriptor>,
    pub pipelines: Vec<PipelineDefinition>,
}

/// Parse a manifest from a file on disk
pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest file: {}", path.display()))?;

    parse_manifest(&source).with_context(|| format!("Invalid manifest: {}", path.display()))
}

/// Parse a manifest from Lua source code
///
/// # Example
/// ```no_run
/// use tandem_lua::parser::parse_manifest;
///
/// let source = r#"
///     local image = "dbt:latest"
///     return {
///         jobs = {
///             { id = "dbt-run", image = image, command = { "run" },
///               requires = { "DBT_PROFILES_YML_SECRET_NAME" } },
///             { id = "dbt-test", image = image, command = { "test" } },
///         },
///         pipelines = {
///             { id = "dbt", steps = { "dbt-run", "dbt-test" } },
///         },
///     }
/// "#;
///
/// let manifest = parse_manifest(source)?;
/// assert_eq!(manifest.jobs.len(), 2);
/// assert_eq!(manifest.pipelines[0].steps, vec!["dbt-run", "dbt-test"]);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn parse_manifest(source: &str) -> Result<Manifest> {
    let lua = create_sandbox().context("Failed to create manifest sandbox")?;

    let manifest: Table = lua
        .load(source)
        .set_name("manifest")
        .eval()
        .context("Failed to evaluate manifest (it must return a table)")?;

    let jobs = parse_jobs(&manifest)?;
    let pipelines = parse_pipelines(&manifest)?;

    if jobs.is_empty() && pipelines.is_empty() {
        anyhow::bail!("Manifest declares no jobs and no pipelines");
    }

    Ok(Manifest { jobs, pipelines })
}

/// Parse the 'jobs' field
fn parse_jobs(manifest: &Table) -> Result<Vec<JobDescriptor>> {
    let value: Value = manifest.get("jobs").unwrap_or(Value::Nil);

    let table = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Table(table) => table,
        _ => anyhow::bail!("Field 'jobs' must be an array of job tables"),
    };

    let mut jobs = Vec::new();
    for (idx, entry) in table.sequence_values::<Table>().enumerate() {
        let job = entry.with_context(|| format!("jobs[{}] must be a table", idx + 1))?;
        jobs.push(parse_job(&job).with_context(|| format!("Invalid jobs[{}]", idx + 1))?);
    }

    Ok(jobs)
}

fn parse_job(job: &Table) -> Result<JobDescriptor> {
    let id: String = job.get("id").context("Job must have an 'id' field")?;

    let container_image: String = job
        .get("image")
        .with_context(|| format!("Job '{}' must have an 'image' field", id))?;

    let command_args = string_list(job, "command")
        .with_context(|| format!("Job '{}': field 'command'", id))?;

    let required_config_keys: BTreeSet<String> = string_list(job, "requires")
        .with_context(|| format!("Job '{}': field 'requires'", id))?
        .into_iter()
        .collect();

    let cpu_units: Option<u32> = job
        .get("cpu")
        .with_context(|| format!("Job '{}': 'cpu' must be a positive integer", id))?;

    let memory_mb: Option<u32> = job
        .get("memory")
        .with_context(|| format!("Job '{}': 'memory' must be a positive integer", id))?;

    let timeout_seconds: Option<u64> = job
        .get("timeout")
        .with_context(|| format!("Job '{}': 'timeout' must be a number of seconds", id))?;

    let retry = parse_retry(job).with_context(|| format!("Job '{}': field 'retry'", id))?;

    Ok(JobDescriptor {
        id,
        container_image,
        command_args,
        cpu_units: cpu_units.unwrap_or(DEFAULT_CPU_UNITS),
        memory_mb: memory_mb.unwrap_or(DEFAULT_MEMORY_MB),
        required_config_keys,
        retry,
        timeout_seconds,
    })
}

fn parse_retry(job: &Table) -> Result<RetryPolicy> {
    let value: Value = job.get("retry").unwrap_or(Value::Nil);

    match value {
        Value::Nil => Ok(RetryPolicy::default()),
        Value::Table(retry) => {
            let defaults = RetryPolicy::default();
            let max_attempts: Option<u32> = retry
                .get("max_attempts")
                .context("'max_attempts' must be a positive integer")?;
            let backoff_ms: Option<u64> = retry
                .get("backoff_ms")
                .context("'backoff_ms' must be a number of milliseconds")?;

            Ok(RetryPolicy {
                max_attempts: max_attempts.unwrap_or(defaults.max_attempts),
                backoff_ms: backoff_ms.unwrap_or(defaults.backoff_ms),
            })
        }
        _ => anyhow::bail!("must be a table with max_attempts and backoff_ms"),
    }
}

/// Parse the 'pipelines' field
fn parse_pipelines(manifest: &Table) -> Result<Vec<PipelineDefinition>> {
    let value: Value = manifest.get("pipelines").unwrap_or(Value::Nil);

    let table = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Table(table) => table,
        _ => anyhow::bail!("Field 'pipelines' must be an array of pipeline tables"),
    };

    let mut pipelines = Vec::new();
    for (idx, entry) in table.sequence_values::<Table>().enumerate() {
        let pipeline = entry.with_context(|| format!("pipelines[{}] must be a table", idx + 1))?;

        let id: String = pipeline
            .get("id")
            .with_context(|| format!("pipelines[{}] must have an 'id' field", idx + 1))?;

        let description: Option<String> = pipeline
            .get("description")
            .with_context(|| format!("Pipeline '{}': 'description' must be a string", id))?;

        let steps = string_list(&pipeline, "steps")
            .with_context(|| format!("Pipeline '{}': field 'steps'", id))?;

        if steps.is_empty() {
            anyhow::bail!("Pipeline '{}' must have at least one step", id);
        }

        pipelines.push(PipelineDefinition {
            id,
            description,
            steps,
        });
    }

    Ok(pipelines)
}

/// Read an optional array of strings
fn string_list(table: &Table, field: &str) -> Result<Vec<String>> {
    let value: Value = table.get(field).unwrap_or(Value::Nil);

    match value {
        Value::Nil => Ok(Vec::new()),
        Value::Table(list) => {
            let mut items = Vec::new();
            for item in list.sequence_values::<String>() {
                items.push(item.context("entries must be strings")?);
            }
            Ok(items)
        }
        _ => anyhow::bail!("must be an array of strings"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_job() {
        let source = r#"
            return {
                jobs = { { id = "hello", image = "alpine:latest" } }
            }
        "#;

        let manifest = parse_manifest(source).unwrap();
        assert_eq!(manifest.jobs.len(), 1);
        assert!(manifest.pipelines.is_empty());

        let job = &manifest.jobs[0];
        assert_eq!(job.id, "hello");
        assert_eq!(job.container_image, "alpine:latest");
        assert!(job.command_args.is_empty());
        assert_eq!(job.cpu_units, 256);
        assert_eq!(job.memory_mb, 512);
        assert_eq!(job.retry.max_attempts, 1);
        assert_eq!(job.timeout_seconds, None);
    }

    #[test]
    fn test_parse_full_job() {
        let source = r#"
            return {
                jobs = {
                    tandem.job {
                        id = "dbt-test",
                        image = "dbt:latest",
                        command = { "test", "--fail-fast" },
                        cpu = 512,
                        memory = 1024,
                        requires = { "DBT_PRIVATE_KEY_SECRET_NAME", "DBT_PROFILES_YML_SECRET_NAME" },
                        timeout = 300,
                        retry = { max_attempts = 3, backoff_ms = 250 },
                    },
                },
            }
        "#;

        let manifest = parse_manifest(source).unwrap();
        let job = &manifest.jobs[0];
        assert_eq!(job.command_args, vec!["test", "--fail-fast"]);
        assert_eq!(job.cpu_units, 512);
        assert_eq!(job.memory_mb, 1024);
        assert_eq!(job.required_config_keys.len(), 2);
        assert!(
            job.required_config_keys
                .contains("DBT_PROFILES_YML_SECRET_NAME")
        );
        assert_eq!(job.timeout_seconds, Some(300));
        assert_eq!(job.retry.max_attempts, 3);
        assert_eq!(job.retry.backoff_ms, 250);
    }

    #[test]
    fn test_parse_pipeline() {
        let source = r#"
            return {
                pipelines = {
                    tandem.pipeline {
                        id = "dbt",
                        description = "run then test",
                        steps = { "dbt-run", "dbt-test" },
                    },
                },
            }
        "#;

        let manifest = parse_manifest(source).unwrap();
        let pipeline = &manifest.pipelines[0];
        assert_eq!(pipeline.id, "dbt");
        assert_eq!(pipeline.description.as_deref(), Some("run then test"));
        assert_eq!(pipeline.steps, vec!["dbt-run", "dbt-test"]);
    }

    #[test]
    fn test_job_missing_image() {
        let source = r#"return { jobs = { { id = "broken" } } }"#;

        let err = format!("{:#}", parse_manifest(source).unwrap_err());
        assert!(err.contains("image"));
    }

    #[test]
    fn test_job_missing_id() {
        let source = r#"return { jobs = { { image = "alpine" } } }"#;

        let err = format!("{:#}", parse_manifest(source).unwrap_err());
        assert!(err.contains("id"));
    }

    #[test]
    fn test_pipeline_without_steps() {
        let source = r#"return { pipelines = { { id = "empty", steps = {} } } }"#;

        let err = format!("{:#}", parse_manifest(source).unwrap_err());
        assert!(err.contains("at least one step"));
    }

    #[test]
    fn test_command_must_be_list() {
        let source = r#"return { jobs = { { id = "x", image = "alpine", command = "run" } } }"#;

        assert!(parse_manifest(source).is_err());
    }

    #[test]
    fn test_empty_manifest_rejected() {
        assert!(parse_manifest("return {}").is_err());
    }

    #[test]
    fn test_invalid_lua() {
        assert!(parse_manifest("this is not valid lua!!!").is_err());
    }

    #[test]
    fn test_manifest_not_returning_table() {
        assert!(parse_manifest(r#"return "not a table""#).is_err());
    }
}
