//! Tandem Runner
//!
//! Launches single containerized job steps and reports their terminal status.
//!
//! Architecture:
//! - Backend: the compute backend collaborator (podman, scripted)
//! - Runner: admission retries, polling, deadlines, cancellation and the
//!   per-descriptor retry policy
//! - Configuration: polling and retry tuning loaded from the environment

pub mod backend;
pub mod config;
pub mod runner;

pub use backend::{BackendError, ComputeBackend, LaunchSpec, TaskHandle, TaskState};
pub use config::RunnerConfig;
pub use runner::JobRunner;
