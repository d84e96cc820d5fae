//! In-memory run tracker

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tandem_core::domain::event::RunEvent;
use tandem_core::domain::invocation::PipelineInvocation;
use tandem_core::{EventSink, OrchestrationError, Result, SinkError};
use uuid::Uuid;

use super::{INVOCATION, RunTracker, clamp_timestamp};

#[derive(Debug, Default)]
struct Log {
    events: HashMap<Uuid, Vec<RunEvent>>,
    invocations: HashMap<Uuid, PipelineInvocation>,
}

/// Run tracker that keeps everything in process memory
#[derive(Debug, Default)]
pub struct MemoryRunTracker {
    log: Mutex<Log>,
}

impl MemoryRunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventSink for MemoryRunTracker {
    async fn append(&self, invocation_id: Uuid, mut event: RunEvent) -> std::result::Result<(), SinkError> {
        let mut log = self.lock();
        let events = log.events.entry(invocation_id).or_default();

        clamp_timestamp(events.last().map(|e| e.timestamp), &mut event);
        events.push(event);

        Ok(())
    }
}

#[async_trait]
impl RunTracker for MemoryRunTracker {
    async fn history(&self, invocation_id: Uuid) -> Result<Vec<RunEvent>> {
        Ok(self
            .lock()
            .events
            .get(&invocation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_invocation(&self, invocation: &PipelineInvocation) -> Result<()> {
        self.lock()
            .invocations
            .insert(invocation.invocation_id, invocation.clone());
        Ok(())
    }

    async fn invocation(&self, invocation_id: Uuid) -> Result<PipelineInvocation> {
        self.lock()
            .invocations
            .get(&invocation_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::not_found(INVOCATION, invocation_id.to_string()))
    }

    async fn list_invocations(&self) -> Result<Vec<PipelineInvocation>> {
        let mut invocations: Vec<_> = self.lock().invocations.values().cloned().collect();
        invocations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invocations)
    }
}
