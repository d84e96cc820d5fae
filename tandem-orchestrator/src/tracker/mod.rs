//! Run Tracker / Audit Log
//!
//! Append-only event history per invocation plus the latest snapshot of
//! each invocation. History is returned in append order; timestamps are
//! clamped at append time so that order is also timestamp order.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tandem_core::domain::event::RunEvent;
use tandem_core::domain::invocation::PipelineInvocation;
use tandem_core::{EventSink, Result};
use uuid::Uuid;

pub use memory::MemoryRunTracker;
pub use sqlite::SqliteRunTracker;

pub(crate) const INVOCATION: &str = "invocation";

/// Audit log of invocations
#[async_trait]
pub trait RunTracker: EventSink {
    /// Events recorded for an invocation, oldest first
    ///
    /// Unknown invocations have an empty history.
    async fn history(&self, invocation_id: Uuid) -> Result<Vec<RunEvent>>;

    /// Stores the latest snapshot of an invocation, replacing the previous one
    async fn save_invocation(&self, invocation: &PipelineInvocation) -> Result<()>;

    async fn invocation(&self, invocation_id: Uuid) -> Result<PipelineInvocation>;

    /// All known invocations, newest first
    async fn list_invocations(&self) -> Result<Vec<PipelineInvocation>>;
}

/// Keeps an invocation's timestamps non-decreasing
///
/// The wall clock can step backwards; an event is never recorded as older
/// than the one appended before it.
pub(crate) fn clamp_timestamp(previous: Option<DateTime<Utc>>, event: &mut RunEvent) {
    if let Some(previous) = previous {
        if event.timestamp < previous {
            event.timestamp = previous;
        }
    }
}
