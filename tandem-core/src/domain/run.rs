//! Job run domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrchestrationError, Result};

/// Lifecycle status shared by job runs and invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "Pending"),
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Succeeded => write!(f, "Succeeded"),
            RunStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RunStatus::Pending),
            "Running" => Ok(RunStatus::Running),
            "Succeeded" => Ok(RunStatus::Succeeded),
            "Failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// Why a job run ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    /// The container ran and exited with a non-zero code
    NonZeroExit,
    /// The backend refused or failed to launch (or lost) the task
    LaunchError,
    /// The runner-enforced deadline elapsed
    TimeoutExceeded,
    /// The invocation was cancelled while the step was in flight
    Cancelled,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::NonZeroExit => write!(f, "NonZeroExit"),
            ExitReason::LaunchError => write!(f, "LaunchError"),
            ExitReason::TimeoutExceeded => write!(f, "TimeoutExceeded"),
            ExitReason::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Execution record of one step within one invocation
///
/// Created `Pending` when the executor dispatches the step and mutated only
/// through the transition methods below. Once terminal it never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    pub job_id: String,
    pub invocation_id: Uuid,
    pub step_index: usize,
    pub status: RunStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub exit_reason: Option<ExitReason>,
    /// Backend diagnostic for the failure, if any
    pub diagnostic: Option<String>,
}

impl JobRun {
    pub fn pending(job_id: impl Into<String>, invocation_id: Uuid, step_index: usize) -> Self {
        Self {
            job_id: job_id.into(),
            invocation_id,
            step_index,
            status: RunStatus::Pending,
            attempts: 0,
            started_at: None,
            ended_at: None,
            exit_code: None,
            exit_reason: None,
            diagnostic: None,
        }
    }

    /// Pending -> Running
    pub fn mark_running(&mut self) -> Result<()> {
        self.check_transition(RunStatus::Running)?;
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Running -> Succeeded
    pub fn succeed(&mut self, exit_code: i32) -> Result<()> {
        self.check_transition(RunStatus::Succeeded)?;
        self.status = RunStatus::Succeeded;
        self.exit_code = Some(exit_code);
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Pending | Running -> Failed
    pub fn fail(
        &mut self,
        reason: ExitReason,
        exit_code: Option<i32>,
        diagnostic: impl Into<String>,
    ) -> Result<()> {
        self.check_transition(RunStatus::Failed)?;
        self.status = RunStatus::Failed;
        self.exit_code = exit_code;
        self.exit_reason = Some(reason);
        self.diagnostic = Some(diagnostic.into());
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    fn check_transition(&self, to: RunStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, to),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Succeeded)
                | (RunStatus::Running, RunStatus::Failed)
        );

        if allowed {
            Ok(())
        } else {
            Err(OrchestrationError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }
}
