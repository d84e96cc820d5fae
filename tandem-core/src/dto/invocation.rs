//! Invocation DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::invocation::PipelineInvocation;
use crate::domain::run::RunStatus;

/// Request to start a pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartInvocation {
    pub definition_id: String,
    /// Per-invocation configuration inputs (key -> value)
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Response to an accepted invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationAccepted {
    pub invocation_id: Uuid,
}

/// Lightweight invocation summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationSummary {
    pub invocation_id: Uuid,
    pub definition_id: String,
    pub overall_status: RunStatus,
    pub steps_run: usize,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<PipelineInvocation> for InvocationSummary {
    fn from(invocation: PipelineInvocation) -> Self {
        Self {
            invocation_id: invocation.invocation_id,
            definition_id: invocation.definition_id,
            overall_status: invocation.overall_status,
            steps_run: invocation.runs.len(),
            created_at: invocation.created_at,
            ended_at: invocation.ended_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_summary_conversion() {
        let invocation = PipelineInvocation::new(Uuid::new_v4(), "dbt");
        let summary: InvocationSummary = invocation.clone().into();
        assert_eq!(summary.invocation_id, invocation.invocation_id);
        assert_eq!(summary.definition_id, "dbt");
        assert_eq!(summary.steps_run, 0);
    }

    #[test]
    fn test_start_invocation_config_defaults_to_empty() {
        let req: StartInvocation = serde_json::from_str(r#"{"definition_id": "dbt"}"#).unwrap();
        assert!(req.config.is_empty());
    }
}
