//! Job runner
//!
//! Runs one step of one invocation to a terminal status:
//!
//! ```text
//!   Pending ──admitted──▶ Running ──exit 0──────────────▶ Succeeded
//!      │                     ├──exit != 0───────────────▶ Failed(NonZeroExit)
//!      │                     ├──stopped / lost──────────▶ Failed(LaunchError)
//!      │                     ├──deadline (one cancel)───▶ Failed(TimeoutExceeded)
//!      │                     └──cancel token (one cancel)▶ Failed(Cancelled)
//!      └──rejected N times / launch error────────────────▶ Failed(LaunchError)
//! ```
//!
//! Failed attempts are retried per the descriptor's retry policy; only the
//! last attempt's status is reported.

use std::sync::Arc;
use std::time::Duration;
use tandem_core::domain::binding::ConfigBinding;
use tandem_core::domain::descriptor::{JobDescriptor, MAX_TIMEOUT_SECONDS, RetryPolicy};
use tandem_core::domain::event::{EventKind, RunEvent};
use tandem_core::domain::run::{ExitReason, JobRun, RunStatus};
use tandem_core::sink::EventSink;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{ComputeBackend, LaunchSpec, TaskHandle, TaskState};
use crate::config::RunnerConfig;

/// Upper bound for the delay between retry attempts
const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// How a single attempt ended
#[derive(Debug)]
enum Attempt {
    Succeeded { exit_code: i32 },
    Failed(AttemptFailure),
}

#[derive(Debug)]
struct AttemptFailure {
    reason: ExitReason,
    exit_code: Option<i32>,
    diagnostic: String,
}

impl AttemptFailure {
    fn new(reason: ExitReason, diagnostic: impl Into<String>) -> Self {
        Self {
            reason,
            exit_code: None,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Identifies the step being run, for events and task names
#[derive(Debug, Clone, Copy)]
struct StepRef {
    invocation_id: Uuid,
    step_index: usize,
}

/// Launches a job on the compute backend and drives it to a terminal status
pub struct JobRunner {
    backend: Arc<dyn ComputeBackend>,
    sink: Arc<dyn EventSink>,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(
        backend: Arc<dyn ComputeBackend>,
        sink: Arc<dyn EventSink>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            backend,
            sink,
            config,
        }
    }

    /// Runs one step to completion and returns its terminal record
    ///
    /// Never returns an error: every failure mode ends as a `Failed` run with
    /// an exit reason. Emits `Pending`, `Running` (first admission) and the
    /// terminal status through the event sink.
    pub async fn run(
        &self,
        invocation_id: Uuid,
        step_index: usize,
        descriptor: &JobDescriptor,
        binding: &ConfigBinding,
        cancel: &CancellationToken,
    ) -> JobRun {
        let step = StepRef {
            invocation_id,
            step_index,
        };
        let mut run = JobRun::pending(descriptor.id.clone(), invocation_id, step_index);
        self.emit_status(step, &run).await;

        let max_attempts = descriptor.retry.max_attempts.max(1);
        // Descriptors built in code skip validation; keep the deadline addable
        let timeout = descriptor
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_timeout)
            .min(Duration::from_secs(MAX_TIMEOUT_SECONDS));

        let mut attempt = 0;
        let failure = loop {
            attempt += 1;
            run.attempts = attempt;

            let spec = LaunchSpec::for_attempt(descriptor, binding, invocation_id, step_index, attempt);

            let failure = match self.attempt(step, &mut run, &spec, timeout, cancel).await {
                Attempt::Succeeded { exit_code } => {
                    info!(
                        "Job {} (step {}) succeeded on attempt {}",
                        descriptor.id, step_index, attempt
                    );
                    if let Err(e) = run.succeed(exit_code) {
                        warn!("Ignoring invalid transition for {}: {}", descriptor.id, e);
                    }
                    break None;
                }
                Attempt::Failed(failure) => failure,
            };

            if failure.reason == ExitReason::Cancelled || attempt >= max_attempts {
                break Some(failure);
            }

            warn!(
                "Job {} (step {}) attempt {}/{} failed ({}): {}",
                descriptor.id, step_index, attempt, max_attempts, failure.reason, failure.diagnostic
            );
            self.emit(
                step,
                EventKind::StepRetrying {
                    job_id: descriptor.id.clone(),
                    attempt: attempt + 1,
                    reason: failure.reason,
                },
            )
            .await;

            let delay = retry_backoff(&descriptor.retry, attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break Some(AttemptFailure::new(
                        ExitReason::Cancelled,
                        "invocation cancelled while waiting to retry",
                    ));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        };

        if let Some(failure) = failure {
            warn!(
                "Job {} (step {}) failed after {} attempt(s): {} ({})",
                descriptor.id, step_index, attempt, failure.reason, failure.diagnostic
            );
            if let Err(e) = run.fail(failure.reason, failure.exit_code, failure.diagnostic) {
                warn!("Ignoring invalid transition for {}: {}", descriptor.id, e);
            }
        }

        self.emit_status(step, &run).await;
        run
    }

    /// One launch-poll cycle
    async fn attempt(
        &self,
        step: StepRef,
        run: &mut JobRun,
        spec: &LaunchSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Attempt {
        let handle = match self.admit(step, spec, cancel).await {
            Ok(handle) => handle,
            Err(failure) => return Attempt::Failed(failure),
        };

        if run.status == RunStatus::Pending {
            match run.mark_running() {
                Ok(()) => self.emit_status(step, run).await,
                Err(e) => warn!("Ignoring invalid transition for {}: {}", spec.job_id, e),
            }
        }

        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + Duration::from_secs(MAX_TIMEOUT_SECONDS));
        let mut poll_errors = 0;

        loop {
            match self.backend.poll(&handle).await {
                Ok(TaskState::Exited { code: 0 }) => {
                    return Attempt::Succeeded { exit_code: 0 };
                }
                Ok(TaskState::Exited { code }) => {
                    return Attempt::Failed(AttemptFailure {
                        reason: ExitReason::NonZeroExit,
                        exit_code: Some(code),
                        diagnostic: format!("container exited with code {}", code),
                    });
                }
                Ok(TaskState::Stopped { message }) => {
                    return Attempt::Failed(AttemptFailure::new(ExitReason::LaunchError, message));
                }
                Ok(state) => {
                    debug!("Task {} is {:?}", handle, state);
                    poll_errors = 0;
                }
                Err(e) => {
                    poll_errors += 1;
                    warn!(
                        "Polling task {} failed ({}/{}): {}",
                        handle, poll_errors, self.config.max_poll_errors, e
                    );
                    if poll_errors >= self.config.max_poll_errors {
                        return Attempt::Failed(AttemptFailure::new(
                            ExitReason::LaunchError,
                            format!("lost track of task {}: {}", handle, e),
                        ));
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.stop(step, spec, &handle, ExitReason::Cancelled).await;
                    return Attempt::Failed(AttemptFailure::new(
                        ExitReason::Cancelled,
                        "invocation cancelled",
                    ));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.stop(step, spec, &handle, ExitReason::TimeoutExceeded).await;
                    return Attempt::Failed(AttemptFailure::new(
                        ExitReason::TimeoutExceeded,
                        format!("deadline of {}s exceeded", timeout.as_secs()),
                    ));
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Launches the task, retrying admission rejections with backoff
    async fn admit(
        &self,
        step: StepRef,
        spec: &LaunchSpec,
        cancel: &CancellationToken,
    ) -> Result<TaskHandle, AttemptFailure> {
        let max = self.config.max_admission_attempts.max(1);
        let mut backoff = self.config.admission_backoff;
        let mut admission = 0;

        loop {
            admission += 1;

            if cancel.is_cancelled() {
                return Err(AttemptFailure::new(
                    ExitReason::Cancelled,
                    "invocation cancelled before launch",
                ));
            }

            let err = match self.backend.launch(spec).await {
                Ok(handle) => {
                    debug!("Task {} admitted for job {}", handle, spec.job_id);
                    return Ok(handle);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(AttemptFailure::new(ExitReason::LaunchError, err.to_string()));
            }

            self.emit(
                step,
                EventKind::LaunchRejected {
                    job_id: spec.job_id.clone(),
                    attempt: admission,
                    message: err.to_string(),
                },
            )
            .await;

            if admission >= max {
                return Err(AttemptFailure::new(
                    ExitReason::LaunchError,
                    format!("admission rejected {} times: {}", admission, err),
                ));
            }

            debug!(
                "Launch of {} rejected ({}/{}), retrying in {:?}",
                spec.job_id, admission, max, backoff
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(AttemptFailure::new(
                        ExitReason::Cancelled,
                        "invocation cancelled before launch",
                    ));
                }
                _ = tokio::time::sleep(backoff) => {}
            }

            backoff = (backoff * 2).min(self.config.max_admission_backoff);
        }
    }

    /// Issues exactly one backend cancel for a running task
    async fn stop(&self, step: StepRef, spec: &LaunchSpec, handle: &TaskHandle, reason: ExitReason) {
        info!("Cancelling task {} for job {} ({})", handle, spec.job_id, reason);

        self.emit(
            step,
            EventKind::CancelRequested {
                job_id: spec.job_id.clone(),
                reason,
            },
        )
        .await;

        if let Err(e) = self.backend.cancel(handle).await {
            warn!("Backend failed to cancel task {}: {}", handle, e);
        }
    }

    async fn emit_status(&self, step: StepRef, run: &JobRun) {
        self.emit(
            step,
            EventKind::StepStatus {
                job_id: run.job_id.clone(),
                status: run.status,
                exit_reason: run.exit_reason,
                exit_code: run.exit_code,
                message: run.diagnostic.clone(),
            },
        )
        .await;
    }

    /// Appends an event; failures are logged and otherwise ignored
    async fn emit(&self, step: StepRef, kind: EventKind) {
        let event = RunEvent::step(step.step_index, kind);
        if let Err(e) = self.sink.append(step.invocation_id, event).await {
            warn!("Failed to record event: {}", e);
        }
    }
}

/// Delay before retry attempt `attempt + 1`
///
/// `backoff_ms * 2^(attempt-1)`, capped at one minute.
pub fn retry_backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    let delay_ms = policy.backoff_ms.saturating_mul(factor);
    Duration::from_millis(delay_ms.min(MAX_RETRY_BACKOFF_MS))
}
