//! Pipeline invocation domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{JobRun, RunStatus};

/// One execution instance of a pipeline definition
///
/// Owned by the executor while it runs; snapshots are persisted by the run
/// tracker as steps complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInvocation {
    pub invocation_id: Uuid,
    pub definition_id: String,
    pub runs: Vec<JobRun>,
    pub overall_status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineInvocation {
    pub fn new(invocation_id: Uuid, definition_id: impl Into<String>) -> Self {
        Self {
            invocation_id,
            definition_id: definition_id.into(),
            runs: Vec::new(),
            overall_status: RunStatus::Pending,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// The run of the step that failed, if any
    pub fn failed_run(&self) -> Option<&JobRun> {
        self.runs.iter().find(|r| r.status == RunStatus::Failed)
    }

    /// Status implied by the contained runs for a pipeline of `step_count` steps
    ///
    /// `Failed` iff any run failed, `Succeeded` iff every step has a
    /// succeeded run, otherwise `Running` (or `Pending` before the first run).
    pub fn derived_status(&self, step_count: usize) -> RunStatus {
        if self.runs.iter().any(|r| r.status == RunStatus::Failed) {
            RunStatus::Failed
        } else if self.runs.len() == step_count
            && self.runs.iter().all(|r| r.status == RunStatus::Succeeded)
        {
            RunStatus::Succeeded
        } else if self.runs.is_empty() {
            RunStatus::Pending
        } else {
            RunStatus::Running
        }
    }
}
