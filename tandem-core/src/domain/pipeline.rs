//! Pipeline domain types

use serde::{Deserialize, Serialize};

/// Ordered sequence of job descriptor references
///
/// Steps run strictly one after another. The referenced descriptors are
/// checked against the descriptor store at registration and again when an
/// invocation is prepared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<String>,
}

impl PipelineDefinition {
    pub fn new(id: impl Into<String>, steps: Vec<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
