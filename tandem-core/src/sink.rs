//! Event sink collaborator
//!
//! The job runner emits one event per status change and the executor emits
//! invocation-level events. Both write through this trait; the run tracker
//! is the production implementation.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::event::RunEvent;

/// Error returned by an event sink
#[derive(Debug, Error)]
#[error("failed to append event for invocation {invocation_id}: {message}")]
pub struct SinkError {
    pub invocation_id: Uuid,
    pub message: String,
}

/// Append-only destination for run events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Appends an event to the invocation's history
    ///
    /// Implementations must never reorder or rewrite earlier entries.
    async fn append(&self, invocation_id: Uuid, event: RunEvent) -> Result<(), SinkError>;
}
