//! Podman compute backend
//!
//! Runs each job as a detached podman container:
//! - `podman run -d` to launch, with configuration passed by variable name
//! - `podman inspect` to poll status and exit code
//! - `podman stop` + `podman rm -f` to cancel and to clean up finished tasks
//!
//! Configuration values are set on the environment of the `podman` process
//! and forwarded with `-e KEY`, so they never appear in argv.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{BackendError, ComputeBackend, LaunchSpec, TaskHandle, TaskState};

/// Format string handed to `podman inspect`
const INSPECT_FORMAT: &str = "{{.State.Status}} {{.State.ExitCode}} {{.State.OOMKilled}}";

/// Checks if podman is installed and available
pub async fn check_podman_available() -> anyhow::Result<()> {
    use anyhow::Context;

    let output = Command::new("podman")
        .arg("--version")
        .output()
        .await
        .context("Failed to execute 'podman --version'. Is podman installed?")?;

    if !output.status.success() {
        anyhow::bail!("Podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Podman is available: {}", version.trim());

    Ok(())
}

/// Podman-backed [`ComputeBackend`]
///
/// At most `max_tasks` containers are admitted at once; further launches are
/// rejected until a task finishes or is cancelled.
pub struct PodmanBackend {
    max_tasks: usize,
    /// Names of containers currently holding an admission slot
    active: Mutex<HashSet<String>>,
}

impl PodmanBackend {
    pub fn new(max_tasks: usize) -> Self {
        Self {
            max_tasks,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Releases the admission slot and removes the container
    async fn release(&self, name: &str) {
        self.active.lock().await.remove(name);

        match Command::new("podman").args(["rm", "-f", name]).output().await {
            Ok(output) if output.status.success() => {
                debug!("Container {} removed", name);
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!("Failed to remove container {}: {}", name, stderr.trim());
            }
            Err(e) => {
                warn!("Failed to remove container {}: {}", name, e);
            }
        }
    }
}

#[async_trait]
impl ComputeBackend for PodmanBackend {
    async fn launch(&self, spec: &LaunchSpec) -> Result<TaskHandle, BackendError> {
        {
            let mut active = self.active.lock().await;
            if active.len() >= self.max_tasks {
                return Err(BackendError::Rejected(format!(
                    "{} of {} task slots in use",
                    active.len(),
                    self.max_tasks
                )));
            }
            active.insert(spec.name.clone());
        }

        info!(
            "Starting container {} for job {} (image {})",
            spec.name, spec.job_id, spec.image
        );

        let output = Command::new("podman")
            .args(build_run_args(spec))
            .envs(spec.env.iter())
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                self.active.lock().await.remove(&spec.name);
                return Err(BackendError::Io(e));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stderr.trim().is_empty() {
            debug!("podman run stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            self.active.lock().await.remove(&spec.name);
            return Err(BackendError::Launch(format!(
                "podman run exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        debug!("Container {} started with ID {}", spec.name, stdout.trim());

        Ok(TaskHandle(spec.name.clone()))
    }

    async fn poll(&self, handle: &TaskHandle) -> Result<TaskState, BackendError> {
        let output = Command::new("podman")
            .args(["inspect", "--format", INSPECT_FORMAT, &handle.0])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("no such") {
                self.active.lock().await.remove(&handle.0);
                return Err(BackendError::UnknownTask(handle.0.clone()));
            }
            return Err(BackendError::Launch(format!(
                "podman inspect failed: {}",
                stderr.trim()
            )));
        }

        let state = parse_state(&String::from_utf8_lossy(&output.stdout))?;

        if state.is_terminal() {
            self.release(&handle.0).await;
        }

        Ok(state)
    }

    async fn cancel(&self, handle: &TaskHandle) -> Result<(), BackendError> {
        info!("Stopping container {}", handle);

        let output = Command::new("podman")
            .args(["stop", "--time", "10", &handle.0])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("podman stop {}: {}", handle, stderr.trim());
        }

        self.release(&handle.0).await;

        Ok(())
    }
}

/// Builds the `podman run` argument list for a launch
pub fn build_run_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--cpus".to_string(),
        format!("{}", f64::from(spec.cpu_units) / 1024.0),
        "--memory".to_string(),
        format!("{}m", spec.memory_mb),
    ];

    for key in spec.env.keys() {
        args.push("-e".to_string());
        args.push(key.to_string());
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());

    args
}

/// Parses `podman inspect` output produced with [`INSPECT_FORMAT`]
pub fn parse_state(output: &str) -> Result<TaskState, BackendError> {
    let mut fields = output.split_whitespace();

    let status = fields
        .next()
        .ok_or_else(|| BackendError::Launch("empty podman inspect output".to_string()))?;
    let exit_code = fields.next().and_then(|s| s.parse::<i32>().ok());
    let oom_killed = fields.next() == Some("true");

    match status {
        "created" | "configured" | "initialized" => Ok(TaskState::Pending),
        "running" | "paused" | "stopping" => Ok(TaskState::Running),
        "exited" | "stopped" if oom_killed => Ok(TaskState::Stopped {
            message: "container was killed: out of memory".to_string(),
        }),
        "exited" | "stopped" => match exit_code {
            Some(code) => Ok(TaskState::Exited { code }),
            None => Ok(TaskState::Stopped {
                message: "container exited without an exit code".to_string(),
            }),
        },
        other => Ok(TaskState::Stopped {
            message: format!("container is {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::domain::binding::ConfigBinding;

    fn spec() -> LaunchSpec {
        let mut env = ConfigBinding::new();
        env.insert("DBT_PROFILES_YML_SECRET_NAME", "profiles-secret");
        env.insert("DBT_PRIVATE_KEY_SECRET_NAME", "key-secret");

        LaunchSpec {
            name: "tandem-abc-0-1".to_string(),
            job_id: "dbt-run".to_string(),
            image: "dbt:latest".to_string(),
            command: vec!["run".to_string(), "--fail-fast".to_string()],
            cpu_units: 256,
            memory_mb: 512,
            env,
        }
    }

    #[test]
    fn test_run_args_layout() {
        let args = build_run_args(&spec());

        assert_eq!(&args[..4], &["run", "-d", "--name", "tandem-abc-0-1"]);
        assert!(args.windows(2).any(|w| w == ["--cpus", "0.25"]));
        assert!(args.windows(2).any(|w| w == ["--memory", "512m"]));
        assert!(
            args.windows(2)
                .any(|w| w == ["-e", "DBT_PROFILES_YML_SECRET_NAME"])
        );

        let image_pos = args.iter().position(|a| a == "dbt:latest").unwrap();
        assert_eq!(&args[image_pos + 1..], &["run", "--fail-fast"]);
    }

    #[test]
    fn test_run_args_never_contain_values() {
        let args = build_run_args(&spec());
        assert!(!args.iter().any(|a| a.contains("profiles-secret")));
        assert!(!args.iter().any(|a| a.contains("key-secret")));
    }

    #[test]
    fn test_whole_cpu_formatting() {
        let mut spec = spec();
        spec.cpu_units = 2048;
        let args = build_run_args(&spec);
        assert!(args.windows(2).any(|w| w == ["--cpus", "2"]));
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("created 0 false\n").unwrap(), TaskState::Pending);
        assert_eq!(parse_state("running 0 false").unwrap(), TaskState::Running);
        assert_eq!(
            parse_state("exited 0 false").unwrap(),
            TaskState::Exited { code: 0 }
        );
        assert_eq!(
            parse_state("exited 2 false").unwrap(),
            TaskState::Exited { code: 2 }
        );
        assert!(matches!(
            parse_state("exited 137 true").unwrap(),
            TaskState::Stopped { .. }
        ));
        assert!(matches!(
            parse_state("dead 0 false").unwrap(),
            TaskState::Stopped { .. }
        ));
        assert!(parse_state("").is_err());
    }
}
