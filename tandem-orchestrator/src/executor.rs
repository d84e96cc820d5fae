//! Pipeline Executor
//!
//! Drives one invocation through an explicit state machine:
//!
//! ```text
//!   NotStarted ──start──▶ Running(0) ──ok──▶ Running(1) ──ok──▶ ... ──ok──▶ Succeeded
//!                              │                 │
//!                              └─────failed──────┴──────────────────────────▶ Failed
//! ```
//!
//! Steps run strictly in order; the first failed step ends the invocation
//! and later steps are never dispatched. Configuration for every step is
//! resolved before step 0 so a missing key never leaves a half-run pipeline.

use std::collections::BTreeSet;
use std::sync::Arc;
use tandem_core::domain::binding::InvocationContext;
use tandem_core::domain::descriptor::JobDescriptor;
use tandem_core::domain::event::{EventKind, RunEvent};
use tandem_core::domain::invocation::PipelineInvocation;
use tandem_core::domain::pipeline::PipelineDefinition;
use tandem_core::domain::run::RunStatus;
use tandem_core::{EventSink, Result};
use tandem_runner::{ComputeBackend, JobRunner, RunnerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::secrets::{ConfigResolver, ScopedResolver};
use crate::store::DescriptorStore;
use crate::tracker::RunTracker;

/// Executor state of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    NotStarted,
    /// Step at this index is being run
    Running(usize),
    Succeeded,
    Failed,
}

/// Input to the transition function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    StepSucceeded,
    StepFailed,
}

impl ExecutorState {
    /// Pure transition function
    ///
    /// Terminal states absorb every input, and inputs that do not apply to
    /// the current state leave it unchanged.
    pub fn next(self, transition: Transition, step_count: usize) -> ExecutorState {
        match (self, transition) {
            (ExecutorState::NotStarted, Transition::Start) if step_count == 0 => {
                ExecutorState::Succeeded
            }
            (ExecutorState::NotStarted, Transition::Start) => ExecutorState::Running(0),
            (ExecutorState::Running(i), Transition::StepSucceeded) if i + 1 >= step_count => {
                ExecutorState::Succeeded
            }
            (ExecutorState::Running(i), Transition::StepSucceeded) => ExecutorState::Running(i + 1),
            (ExecutorState::Running(_), Transition::StepFailed) => ExecutorState::Failed,
            (state, _) => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutorState::Succeeded | ExecutorState::Failed)
    }

    /// Invocation status reported for this state
    pub fn status(&self) -> RunStatus {
        match self {
            ExecutorState::NotStarted => RunStatus::Pending,
            ExecutorState::Running(_) => RunStatus::Running,
            ExecutorState::Succeeded => RunStatus::Succeeded,
            ExecutorState::Failed => RunStatus::Failed,
        }
    }
}

/// A validated invocation whose configuration has been resolved
///
/// Owns the invocation's resolution scope, so cached configuration lives
/// exactly as long as the invocation.
pub struct PreparedInvocation {
    definition: PipelineDefinition,
    steps: Vec<JobDescriptor>,
    scope: ScopedResolver,
}

impl PreparedInvocation {
    pub fn invocation_id(&self) -> Uuid {
        self.scope.context().invocation_id
    }
}

/// Runs pipeline invocations
///
/// Holds no per-invocation state; any number of invocations, including of
/// the same definition, may run concurrently.
pub struct PipelineExecutor {
    store: Arc<DescriptorStore>,
    resolver: ConfigResolver,
    runner: JobRunner,
    tracker: Arc<dyn RunTracker>,
}

impl PipelineExecutor {
    pub fn new<T>(
        store: Arc<DescriptorStore>,
        resolver: ConfigResolver,
        backend: Arc<dyn ComputeBackend>,
        tracker: Arc<T>,
        config: RunnerConfig,
    ) -> Self
    where
        T: RunTracker + 'static,
    {
        let sink: Arc<dyn EventSink> = tracker.clone();
        Self {
            store,
            resolver,
            runner: JobRunner::new(backend, sink, config),
            tracker,
        }
    }

    pub fn store(&self) -> &Arc<DescriptorStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<dyn RunTracker> {
        &self.tracker
    }

    /// Validates the definition and resolves every step's configuration
    ///
    /// Fails with `NotFound`, `InvalidDefinition`, `MissingConfig` or
    /// `Provider`. On failure an `InvocationRejected` event is recorded under
    /// the context's invocation id and nothing is launched.
    pub async fn prepare(
        &self,
        definition_id: &str,
        context: InvocationContext,
    ) -> Result<PreparedInvocation> {
        let invocation_id = context.invocation_id;

        match self.try_prepare(definition_id, context).await {
            Ok(prepared) => Ok(prepared),
            Err(e) => {
                warn!(
                    "Invocation {} of {} rejected: {}",
                    invocation_id, definition_id, e
                );
                self.record(
                    invocation_id,
                    RunEvent::invocation(EventKind::InvocationRejected {
                        definition_id: definition_id.to_string(),
                        error: e.to_string(),
                    }),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn try_prepare(
        &self,
        definition_id: &str,
        context: InvocationContext,
    ) -> Result<PreparedInvocation> {
        let definition = self.store.pipeline(definition_id)?;
        let steps = self.store.validate(&definition)?;

        let required: BTreeSet<String> = steps
            .iter()
            .flat_map(|d| d.required_config_keys.iter().cloned())
            .collect();

        let scope = self.resolver.scope(context);
        scope.resolve(&required).await?;

        Ok(PreparedInvocation {
            definition,
            steps,
            scope,
        })
    }

    /// Runs a prepared invocation to a terminal status
    ///
    /// A failed step yields `Ok` with `overall_status == Failed`; the failing
    /// run carries the exit reason and backend diagnostic.
    pub async fn run(
        &self,
        prepared: PreparedInvocation,
        cancel: CancellationToken,
    ) -> Result<PipelineInvocation> {
        let PreparedInvocation {
            definition,
            steps,
            scope,
        } = prepared;
        let invocation_id = scope.context().invocation_id;
        let step_count = steps.len();

        info!(
            "Invocation {} of {} started ({} steps)",
            invocation_id, definition.id, step_count
        );

        let mut invocation = PipelineInvocation::new(invocation_id, definition.id.clone());
        self.record(
            invocation_id,
            RunEvent::invocation(EventKind::InvocationStarted {
                definition_id: definition.id.clone(),
                steps: step_count,
            }),
        )
        .await;

        let mut state = ExecutorState::NotStarted.next(Transition::Start, step_count);
        invocation.overall_status = state.status();
        self.snapshot(&invocation).await;

        while let ExecutorState::Running(index) = state {
            let descriptor = &steps[index];

            // Served from the scope's cache after pre-flight
            let binding = scope.resolve(&descriptor.required_config_keys).await?;

            let run = self
                .runner
                .run(invocation_id, index, descriptor, &binding, &cancel)
                .await;

            let transition = if run.status == RunStatus::Succeeded {
                Transition::StepSucceeded
            } else {
                Transition::StepFailed
            };

            invocation.runs.push(run);
            state = state.next(transition, step_count);
            invocation.overall_status = state.status();
            if state.is_terminal() {
                invocation.ended_at = Some(chrono::Utc::now());
                debug_assert_eq!(invocation.derived_status(step_count), invocation.overall_status);
            }
            self.snapshot(&invocation).await;
        }

        match invocation.failed_run() {
            Some(run) => warn!(
                "Invocation {} failed at step {} ({}): {}",
                invocation_id,
                run.step_index,
                run.job_id,
                run.diagnostic.as_deref().unwrap_or("no diagnostic")
            ),
            None => info!("Invocation {} succeeded", invocation_id),
        }

        self.record(
            invocation_id,
            RunEvent::invocation(EventKind::InvocationFinished {
                status: invocation.overall_status,
            }),
        )
        .await;

        Ok(invocation)
    }

    /// `prepare` followed by `run`
    pub async fn execute(
        &self,
        definition_id: &str,
        context: InvocationContext,
        cancel: CancellationToken,
    ) -> Result<PipelineInvocation> {
        let prepared = self.prepare(definition_id, context).await?;
        self.run(prepared, cancel).await
    }

    async fn record(&self, invocation_id: Uuid, event: RunEvent) {
        if let Err(e) = self.tracker.append(invocation_id, event).await {
            warn!("Failed to record event: {}", e);
        }
    }

    async fn snapshot(&self, invocation: &PipelineInvocation) {
        if let Err(e) = self.tracker.save_invocation(invocation).await {
            warn!(
                "Failed to save snapshot of invocation {}: {}",
                invocation.invocation_id, e
            );
        }
    }
}
