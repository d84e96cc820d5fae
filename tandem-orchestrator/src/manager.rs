//! Invocation manager
//!
//! Runs each accepted invocation on its own tokio task and keeps a
//! cancellation token for every invocation that is still live.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tandem_core::domain::binding::InvocationContext;
use tandem_core::domain::invocation::PipelineInvocation;
use tandem_core::{OrchestrationError, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::executor::PipelineExecutor;
use crate::tracker::INVOCATION;

struct LiveInvocation {
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<PipelineInvocation>>>,
}

type LiveMap = Arc<Mutex<HashMap<Uuid, LiveInvocation>>>;

pub struct InvocationManager {
    executor: Arc<PipelineExecutor>,
    live: LiveMap,
}

impl InvocationManager {
    pub fn new(executor: Arc<PipelineExecutor>) -> Self {
        Self {
            executor,
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn executor(&self) -> &Arc<PipelineExecutor> {
        &self.executor
    }

    /// Prepares an invocation and starts it in the background
    ///
    /// Validation and configuration errors are returned here, before any
    /// task is spawned.
    pub async fn start(
        &self,
        definition_id: &str,
        inputs: BTreeMap<String, String>,
    ) -> Result<Uuid> {
        let prepared = self
            .executor
            .prepare(definition_id, InvocationContext::new(inputs))
            .await?;
        let invocation_id = prepared.invocation_id();
        let cancel = CancellationToken::new();

        // Held across spawn so the task cannot deregister before it is registered
        let mut live = self.live.lock().await;

        let executor = self.executor.clone();
        let registry = self.live.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = executor.run(prepared, token).await;
            registry.lock().await.remove(&invocation_id);
            result
        });

        live.insert(
            invocation_id,
            LiveInvocation {
                cancel,
                handle: Some(handle),
            },
        );

        info!("Invocation {} of {} accepted", invocation_id, definition_id);

        Ok(invocation_id)
    }

    /// Requests cancellation of a live invocation
    pub async fn cancel(&self, invocation_id: Uuid) -> Result<()> {
        let live = self.live.lock().await;
        let entry = live
            .get(&invocation_id)
            .ok_or_else(|| OrchestrationError::not_found(INVOCATION, invocation_id.to_string()))?;

        info!("Cancelling invocation {}", invocation_id);
        entry.cancel.cancel();

        Ok(())
    }

    /// Waits for an invocation to finish and returns its final state
    ///
    /// Invocations that already finished are read back from the tracker.
    pub async fn wait(&self, invocation_id: Uuid) -> Result<PipelineInvocation> {
        let handle = self
            .live
            .lock()
            .await
            .get_mut(&invocation_id)
            .and_then(|entry| entry.handle.take());

        match handle {
            Some(handle) => handle.await.map_err(|e| {
                error!("Invocation task {} ended abnormally: {}", invocation_id, e);
                OrchestrationError::Internal(format!("invocation {} task failed: {}", invocation_id, e))
            })?,
            None => self.executor.tracker().invocation(invocation_id).await,
        }
    }

    /// Ids of invocations that are still running
    pub async fn live_invocations(&self) -> Vec<Uuid> {
        self.live.lock().await.keys().copied().collect()
    }

    /// Cancels every live invocation
    pub async fn shutdown(&self) {
        let live = self.live.lock().await;
        if !live.is_empty() {
            info!("Cancelling {} live invocation(s)", live.len());
        }
        for entry in live.values() {
            entry.cancel.cancel();
        }
    }
}
