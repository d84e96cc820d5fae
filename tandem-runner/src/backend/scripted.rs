//! Scripted compute backend
//!
//! A deterministic in-process backend. Each job id gets a [`JobScript`]
//! describing how many launches are rejected and how each admitted attempt
//! ends. Used by `tandem run-pipeline --dry-run` and by the test suites; it
//! records every launch, launched environment and cancel request.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tandem_core::domain::binding::ConfigBinding;
use tracing::debug;

use super::{BackendError, ComputeBackend, LaunchSpec, TaskHandle, TaskState};

/// How one admitted attempt ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Runs for the script's poll count, then exits with this code
    Exit(i32),
    /// Never finishes on its own
    Hang,
    /// Disappears from the backend after launch
    Vanish,
    /// Launch fails with a non-retryable error
    LaunchFails(String),
}

/// Behaviour of one job id
#[derive(Debug, Clone)]
pub struct JobScript {
    rejections: u32,
    /// One entry per attempt; the last entry repeats
    outcomes: Vec<Outcome>,
    polls_before_exit: u32,
}

impl JobScript {
    pub fn exits(code: i32) -> Self {
        Self {
            rejections: 0,
            outcomes: vec![Outcome::Exit(code)],
            polls_before_exit: 0,
        }
    }

    pub fn hangs() -> Self {
        Self {
            rejections: 0,
            outcomes: vec![Outcome::Hang],
            polls_before_exit: 0,
        }
    }

    pub fn vanishes() -> Self {
        Self {
            rejections: 0,
            outcomes: vec![Outcome::Vanish],
            polls_before_exit: 0,
        }
    }

    pub fn launch_fails(message: impl Into<String>) -> Self {
        Self {
            rejections: 0,
            outcomes: vec![Outcome::LaunchFails(message.into())],
            polls_before_exit: 0,
        }
    }

    /// Reject the first `count` launch requests with a capacity error
    pub fn with_rejections(mut self, count: u32) -> Self {
        self.rejections = count;
        self
    }

    /// Outcome of the next attempt after those already scripted
    pub fn then(mut self, outcome: Outcome) -> Self {
        self.outcomes.push(outcome);
        self
    }

    /// Report `Running` this many times before an exit becomes visible
    pub fn with_polls(mut self, polls: u32) -> Self {
        self.polls_before_exit = polls;
        self
    }

    fn outcome_for(&self, attempt: usize) -> Outcome {
        self.outcomes
            .get(attempt)
            .or_else(|| self.outcomes.last())
            .cloned()
            .unwrap_or(Outcome::Exit(0))
    }
}

impl Default for JobScript {
    fn default() -> Self {
        Self::exits(0)
    }
}

#[derive(Debug)]
struct Task {
    job_id: String,
    outcome: Outcome,
    polls_remaining: u32,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: HashMap<String, JobScript>,
    rejected: HashMap<String, u32>,
    launches: Vec<(String, ConfigBinding)>,
    cancels: HashMap<String, u32>,
    tasks: HashMap<String, Task>,
}

/// In-process [`ComputeBackend`] driven by per-job scripts
///
/// Jobs without a script exit 0 on their first poll.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    inner: Mutex<Inner>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the script for a job id
    pub fn script(self, job_id: impl Into<String>, script: JobScript) -> Self {
        self.lock().scripts.insert(job_id.into(), script);
        self
    }

    /// Number of admitted launches for a job
    pub fn launch_count(&self, job_id: &str) -> usize {
        self.lock()
            .launches
            .iter()
            .filter(|(id, _)| id == job_id)
            .count()
    }

    /// Number of launches rejected for a job
    pub fn rejection_count(&self, job_id: &str) -> u32 {
        self.lock().rejected.get(job_id).copied().unwrap_or(0)
    }

    /// Number of cancel requests received for a job's tasks
    pub fn cancel_count(&self, job_id: &str) -> u32 {
        self.lock().cancels.get(job_id).copied().unwrap_or(0)
    }

    /// Job ids in the order they were admitted
    pub fn launch_order(&self) -> Vec<String> {
        self.lock().launches.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Environments handed to each admitted launch of a job
    pub fn launched_env(&self, job_id: &str) -> Vec<ConfigBinding> {
        self.lock()
            .launches
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, env)| env.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ComputeBackend for ScriptedBackend {
    async fn launch(&self, spec: &LaunchSpec) -> Result<TaskHandle, BackendError> {
        let mut inner = self.lock();
        let script = inner.scripts.get(&spec.job_id).cloned().unwrap_or_default();

        let rejected = inner.rejected.entry(spec.job_id.clone()).or_insert(0);
        if *rejected < script.rejections {
            *rejected += 1;
            return Err(BackendError::Rejected(format!(
                "no capacity for {} (scripted rejection {})",
                spec.job_id, rejected
            )));
        }

        let attempt = inner
            .launches
            .iter()
            .filter(|(id, _)| id == &spec.job_id)
            .count();
        let outcome = script.outcome_for(attempt);

        if let Outcome::LaunchFails(message) = &outcome {
            return Err(BackendError::Launch(message.clone()));
        }

        debug!("Scripted launch of {} as {}", spec.job_id, spec.name);

        inner
            .launches
            .push((spec.job_id.clone(), spec.env.clone()));
        inner.tasks.insert(
            spec.name.clone(),
            Task {
                job_id: spec.job_id.clone(),
                outcome,
                polls_remaining: script.polls_before_exit,
            },
        );

        Ok(TaskHandle(spec.name.clone()))
    }

    async fn poll(&self, handle: &TaskHandle) -> Result<TaskState, BackendError> {
        let mut inner = self.lock();
        let task = inner
            .tasks
            .get_mut(&handle.0)
            .ok_or_else(|| BackendError::UnknownTask(handle.0.clone()))?;

        let state = match task.outcome.clone() {
            Outcome::Hang => TaskState::Running,
            Outcome::Vanish => {
                inner.tasks.remove(&handle.0);
                return Err(BackendError::UnknownTask(handle.0.clone()));
            }
            Outcome::LaunchFails(message) => TaskState::Stopped { message },
            Outcome::Exit(_) if task.polls_remaining > 0 => {
                task.polls_remaining -= 1;
                TaskState::Running
            }
            Outcome::Exit(code) => TaskState::Exited { code },
        };

        // Finished tasks are reported once, then forgotten
        if state.is_terminal() {
            inner.tasks.remove(&handle.0);
        }

        Ok(state)
    }

    async fn cancel(&self, handle: &TaskHandle) -> Result<(), BackendError> {
        let mut inner = self.lock();
        let task = inner
            .tasks
            .remove(&handle.0)
            .ok_or_else(|| BackendError::UnknownTask(handle.0.clone()))?;

        *inner.cancels.entry(task.job_id).or_insert(0) += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(job_id: &str, name: &str) -> LaunchSpec {
        LaunchSpec {
            name: name.to_string(),
            job_id: job_id.to_string(),
            image: "alpine".to_string(),
            command: Vec::new(),
            cpu_units: 256,
            memory_mb: 512,
            env: ConfigBinding::new(),
        }
    }

    #[tokio::test]
    async fn test_unscripted_job_exits_zero() {
        let backend = ScriptedBackend::new();
        let handle = backend.launch(&spec("any", "t1")).await.unwrap();
        assert_eq!(
            backend.poll(&handle).await.unwrap(),
            TaskState::Exited { code: 0 }
        );
        assert_eq!(backend.launch_count("any"), 1);
    }

    #[tokio::test]
    async fn test_rejections_then_admission() {
        let backend = ScriptedBackend::new().script("job", JobScript::exits(0).with_rejections(2));

        assert!(backend.launch(&spec("job", "t1")).await.is_err());
        assert!(backend.launch(&spec("job", "t2")).await.is_err());
        assert!(backend.launch(&spec("job", "t3")).await.is_ok());
        assert_eq!(backend.rejection_count("job"), 2);
        assert_eq!(backend.launch_count("job"), 1);
    }

    #[tokio::test]
    async fn test_outcomes_follow_attempts() {
        let backend = ScriptedBackend::new().script(
            "flaky",
            JobScript::exits(1).then(Outcome::Exit(0)).with_polls(1),
        );

        let first = backend.launch(&spec("flaky", "t1")).await.unwrap();
        assert_eq!(backend.poll(&first).await.unwrap(), TaskState::Running);
        assert_eq!(
            backend.poll(&first).await.unwrap(),
            TaskState::Exited { code: 1 }
        );

        let second = backend.launch(&spec("flaky", "t2")).await.unwrap();
        backend.poll(&second).await.unwrap();
        assert_eq!(
            backend.poll(&second).await.unwrap(),
            TaskState::Exited { code: 0 }
        );
    }

    #[tokio::test]
    async fn test_finished_tasks_are_released() {
        let backend = ScriptedBackend::new()
            .script("dbt-run", JobScript::exits(0).with_polls(1))
            .script("slow", JobScript::hangs());

        let done = backend.launch(&spec("dbt-run", "t1")).await.unwrap();
        let slow = backend.launch(&spec("slow", "t2")).await.unwrap();
        assert_eq!(backend.poll(&done).await.unwrap(), TaskState::Running);
        assert_eq!(backend.lock().tasks.len(), 2);

        assert_eq!(
            backend.poll(&done).await.unwrap(),
            TaskState::Exited { code: 0 }
        );
        assert_eq!(backend.poll(&slow).await.unwrap(), TaskState::Running);
        assert_eq!(backend.lock().tasks.len(), 1);
        assert!(backend.poll(&done).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_is_recorded() {
        let backend = ScriptedBackend::new().script("slow", JobScript::hangs());
        let handle = backend.launch(&spec("slow", "t1")).await.unwrap();

        backend.cancel(&handle).await.unwrap();
        assert_eq!(backend.cancel_count("slow"), 1);
        assert!(backend.poll(&handle).await.is_err());
    }
}
