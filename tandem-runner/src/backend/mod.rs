//! Compute backend abstraction
//!
//! The [`ComputeBackend`] trait is the only way the runner touches compute
//! capacity, which keeps the runner testable without a container engine.
//!
//! ```text
//!   JobRunner ──launch/poll/cancel──▶ ComputeBackend (trait)
//!                                        ├── PodmanBackend   (containers)
//!                                        └── ScriptedBackend (dry runs, tests)
//! ```

pub mod podman;
pub mod scripted;

use async_trait::async_trait;
use tandem_core::domain::binding::ConfigBinding;
use tandem_core::domain::descriptor::JobDescriptor;
use thiserror::Error;
use uuid::Uuid;

pub use podman::PodmanBackend;
pub use scripted::{JobScript, ScriptedBackend};

/// Everything a backend needs to start one task
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Unique task name, stable across polls
    pub name: String,
    pub job_id: String,
    pub image: String,
    pub command: Vec<String>,
    pub cpu_units: u32,
    pub memory_mb: u32,
    /// Environment injected into the container
    pub env: ConfigBinding,
}

impl LaunchSpec {
    /// Builds the launch spec for one attempt of a step
    pub fn for_attempt(
        descriptor: &JobDescriptor,
        binding: &ConfigBinding,
        invocation_id: Uuid,
        step_index: usize,
        attempt: u32,
    ) -> Self {
        let short_id: String = invocation_id.simple().to_string().chars().take(12).collect();

        Self {
            name: format!("tandem-{}-{}-{}", short_id, step_index, attempt),
            job_id: descriptor.id.clone(),
            image: descriptor.container_image.clone(),
            command: descriptor.command_args.clone(),
            cpu_units: descriptor.cpu_units,
            memory_mb: descriptor.memory_mb,
            env: binding.clone(),
        }
    }
}

/// Backend-assigned identifier of a launched task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub String);

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task state as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    /// The container process exited with this code
    Exited { code: i32 },
    /// The task ended without an exit code (evicted, failed to start, lost)
    Stopped { message: String },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Exited { .. } | TaskState::Stopped { .. })
    }
}

/// Errors reported by a compute backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Admission rejected (capacity exhausted, throttled); safe to retry
    #[error("launch rejected by backend: {0}")]
    Rejected(String),

    /// The launch itself failed
    #[error("launch failed: {0}")]
    Launch(String),

    /// The backend does not know the task
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Check if the runner should retry admission
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Rejected(_))
    }
}

/// Compute backend collaborator
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Starts a task; returns once the backend has accepted it
    async fn launch(&self, spec: &LaunchSpec) -> Result<TaskHandle, BackendError>;

    /// Reports the current state of a task
    async fn poll(&self, handle: &TaskHandle) -> Result<TaskState, BackendError>;

    /// Requests the task be stopped; best effort
    async fn cancel(&self, handle: &TaskHandle) -> Result<(), BackendError>;
}
