//! Error taxonomy for orchestration

use thiserror::Error;

use crate::domain::run::RunStatus;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Errors surfaced to callers of the store, resolver, executor and tracker
///
/// Step-level failures (launch errors, non-zero exits, timeouts) are not
/// errors at this level: they are recorded on the `JobRun` and turn the
/// invocation `Failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    /// Descriptor, pipeline or invocation lookup miss
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Registration conflict
    #[error("{kind} '{id}' is already registered")]
    DuplicateId { kind: &'static str, id: String },

    /// One or more required configuration keys could not be resolved
    #[error("missing required configuration: {}", keys.join(", "))]
    MissingConfig { keys: Vec<String> },

    /// Pipeline or descriptor failed validation
    #[error("invalid definition '{id}': {reason}")]
    InvalidDefinition { id: String, reason: String },

    /// The secret/config provider itself failed (as opposed to a missing key)
    #[error("secret provider error: {0}")]
    Provider(String),

    /// A job run was asked to leave a terminal state or skip a state
    #[error("invalid job run transition from {from} to {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    /// The audit log could not be read or written
    #[error("run tracker error: {0}")]
    Tracker(String),

    /// An invocation task ended abnormally (panicked or was aborted)
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestrationError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn duplicate(kind: &'static str, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error was caused by configuration or definition input
    ///
    /// These are the errors a CLI reports with exit code 2.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::DuplicateId { .. }
                | Self::MissingConfig { .. }
                | Self::InvalidDefinition { .. }
        )
    }
}
