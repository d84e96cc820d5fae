//! Audit event domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::run::{ExitReason, RunStatus};

/// One entry of an invocation's audit history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    pub timestamp: DateTime<Utc>,
    /// Step the event belongs to; `None` for invocation-level events
    pub step_index: Option<usize>,
    pub kind: EventKind,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    InvocationStarted {
        definition_id: String,
        steps: usize,
    },
    /// Validation or pre-flight configuration failed; nothing was launched
    InvocationRejected {
        definition_id: String,
        error: String,
    },
    StepStatus {
        job_id: String,
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_reason: Option<ExitReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The backend refused admission; the launch will be retried
    LaunchRejected {
        job_id: String,
        attempt: u32,
        message: String,
    },
    StepRetrying {
        job_id: String,
        attempt: u32,
        reason: ExitReason,
    },
    CancelRequested {
        job_id: String,
        reason: ExitReason,
    },
    InvocationFinished {
        status: RunStatus,
    },
}

impl RunEvent {
    pub fn invocation(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            step_index: None,
            kind,
        }
    }

    pub fn step(step_index: usize, kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            step_index: Some(step_index),
            kind,
        }
    }

    /// Status carried by a `StepStatus` event
    pub fn step_status(&self) -> Option<RunStatus> {
        match &self.kind {
            EventKind::StepStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = RunEvent::step(
            1,
            EventKind::StepStatus {
                job_id: "dbt-test".to_string(),
                status: RunStatus::Failed,
                exit_reason: Some(ExitReason::NonZeroExit),
                exit_code: Some(1),
                message: Some("exit code 1".to_string()),
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "step_status");
        assert_eq!(json["kind"]["exit_reason"], "NonZeroExit");
        assert_eq!(json["step_index"], 1);

        let back: RunEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.step_status(), Some(RunStatus::Failed));
    }

    #[test]
    fn test_invocation_events_have_no_step() {
        let event = RunEvent::invocation(EventKind::InvocationFinished {
            status: RunStatus::Succeeded,
        });
        assert!(event.step_index.is_none());
        assert!(event.step_status().is_none());
    }
}
