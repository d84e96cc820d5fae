use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tandem_core::domain::binding::ConfigBinding;
use tandem_core::domain::descriptor::{JobDescriptor, MAX_TIMEOUT_SECONDS};
use tandem_core::domain::event::{EventKind, RunEvent};
use tandem_core::domain::run::{ExitReason, RunStatus};
use tandem_core::sink::{EventSink, SinkError};
use tandem_runner::backend::scripted::{JobScript, Outcome, ScriptedBackend};
use tandem_runner::{JobRunner, RunnerConfig};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    fn statuses(&self) -> Vec<RunStatus> {
        self.events().iter().filter_map(|e| e.step_status()).collect()
    }

    fn count(&self, matches: impl Fn(&EventKind) -> bool) -> usize {
        self.events().iter().filter(|e| matches(&e.kind)).count()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn append(&self, _invocation_id: Uuid, event: RunEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

struct BrokenSink;

#[async_trait]
impl EventSink for BrokenSink {
    async fn append(&self, invocation_id: Uuid, _event: RunEvent) -> Result<(), SinkError> {
        Err(SinkError {
            invocation_id,
            message: "disk full".to_string(),
        })
    }
}

fn fast_config() -> RunnerConfig {
    RunnerConfig {
        poll_interval: Duration::from_secs(2),
        default_timeout: Duration::from_secs(300),
        max_admission_attempts: 5,
        admission_backoff: Duration::from_millis(100),
        max_admission_backoff: Duration::from_secs(1),
        max_poll_errors: 3,
    }
}

fn job(id: &str) -> JobDescriptor {
    JobDescriptor::new(id, "dbt:latest", vec!["run".to_string()])
}

fn runner(backend: Arc<ScriptedBackend>, sink: Arc<RecordingSink>) -> JobRunner {
    JobRunner::new(backend, sink, fast_config())
}

#[tokio::test(start_paused = true)]
async fn test_successful_run_emits_lifecycle() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-run", JobScript::exits(0).with_polls(2)));
    let sink = Arc::new(RecordingSink::default());

    let run = runner(backend.clone(), sink.clone())
        .run(Uuid::new_v4(), 0, &job("dbt-run"), &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.exit_code, Some(0));
    assert_eq!(run.attempts, 1);
    assert!(run.started_at.is_some() && run.ended_at.is_some());
    assert_eq!(
        sink.statuses(),
        vec![RunStatus::Pending, RunStatus::Running, RunStatus::Succeeded]
    );
}

#[tokio::test(start_paused = true)]
async fn test_admission_rejections_are_retried() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-run", JobScript::exits(0).with_rejections(3)));
    let sink = Arc::new(RecordingSink::default());

    let run = runner(backend.clone(), sink.clone())
        .run(Uuid::new_v4(), 0, &job("dbt-run"), &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(backend.rejection_count("dbt-run"), 3);
    assert_eq!(backend.launch_count("dbt-run"), 1);
    assert_eq!(
        sink.count(|k| matches!(k, EventKind::LaunchRejected { .. })),
        3
    );
    assert_eq!(
        sink.statuses(),
        vec![RunStatus::Pending, RunStatus::Running, RunStatus::Succeeded]
    );
}

#[tokio::test(start_paused = true)]
async fn test_admission_exhaustion_is_launch_error() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-run", JobScript::exits(0).with_rejections(100)));
    let sink = Arc::new(RecordingSink::default());

    let run = runner(backend.clone(), sink.clone())
        .run(Uuid::new_v4(), 0, &job("dbt-run"), &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_reason, Some(ExitReason::LaunchError));
    assert_eq!(backend.rejection_count("dbt-run"), 5);
    assert_eq!(backend.launch_count("dbt-run"), 0);
    // Never reached Running
    assert_eq!(sink.statuses(), vec![RunStatus::Pending, RunStatus::Failed]);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_launch_failure() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-run", JobScript::launch_fails("image not found")));
    let sink = Arc::new(RecordingSink::default());

    let run = runner(backend.clone(), sink.clone())
        .run(Uuid::new_v4(), 0, &job("dbt-run"), &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.exit_reason, Some(ExitReason::LaunchError));
    assert!(run.diagnostic.unwrap().contains("image not found"));
    assert_eq!(sink.count(|k| matches!(k, EventKind::LaunchRejected { .. })), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_exactly_once() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-run", JobScript::hangs()));
    let sink = Arc::new(RecordingSink::default());
    let descriptor = job("dbt-run").with_timeout(10);

    let started = tokio::time::Instant::now();
    let run = runner(backend.clone(), sink.clone())
        .run(Uuid::new_v4(), 0, &descriptor, &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_reason, Some(ExitReason::TimeoutExceeded));
    assert_eq!(backend.cancel_count("dbt-run"), 1);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(
        sink.count(|k| matches!(
            k,
            EventKind::CancelRequested {
                reason: ExitReason::TimeoutExceeded,
                ..
            }
        )),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_default_deadline_applies() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-run", JobScript::hangs()));
    let sink = Arc::new(RecordingSink::default());

    let started = tokio::time::Instant::now();
    let run = runner(backend.clone(), sink)
        .run(Uuid::new_v4(), 0, &job("dbt-run"), &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.exit_reason, Some(ExitReason::TimeoutExceeded));
    assert!(started.elapsed() >= Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn test_oversized_timeout_is_clamped() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-run", JobScript::hangs()));
    let sink = Arc::new(RecordingSink::default());
    let descriptor = job("dbt-run").with_timeout(u64::MAX);
    let config = RunnerConfig {
        poll_interval: Duration::from_secs(3600),
        ..fast_config()
    };

    let started = tokio::time::Instant::now();
    let run = JobRunner::new(backend.clone(), sink, config)
        .run(Uuid::new_v4(), 0, &descriptor, &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_reason, Some(ExitReason::TimeoutExceeded));
    assert!(started.elapsed() >= Duration::from_secs(MAX_TIMEOUT_SECONDS));
}

#[tokio::test(start_paused = true)]
async fn test_non_zero_exit_fails() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-test", JobScript::exits(2)));
    let sink = Arc::new(RecordingSink::default());

    let run = runner(backend.clone(), sink.clone())
        .run(Uuid::new_v4(), 1, &job("dbt-test"), &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_reason, Some(ExitReason::NonZeroExit));
    assert_eq!(run.exit_code, Some(2));
    assert_eq!(run.step_index, 1);

    let last = sink.events().pop().unwrap();
    assert_eq!(last.step_index, Some(1));
    match last.kind {
        EventKind::StepStatus {
            status,
            exit_reason,
            exit_code,
            ..
        } => {
            assert_eq!(status, RunStatus::Failed);
            assert_eq!(exit_reason, Some(ExitReason::NonZeroExit));
            assert_eq!(exit_code, Some(2));
        }
        other => panic!("unexpected final event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_recovers() {
    let backend = Arc::new(
        ScriptedBackend::new().script("dbt-run", JobScript::exits(1).then(Outcome::Exit(0))),
    );
    let sink = Arc::new(RecordingSink::default());
    let descriptor = job("dbt-run").with_retry(3, 500);

    let run = runner(backend.clone(), sink.clone())
        .run(Uuid::new_v4(), 0, &descriptor, &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.attempts, 2);
    assert_eq!(backend.launch_count("dbt-run"), 2);
    assert_eq!(sink.count(|k| matches!(k, EventKind::StepRetrying { .. })), 1);
    // Only the final attempt's terminal status is reported
    assert_eq!(
        sink.statuses(),
        vec![RunStatus::Pending, RunStatus::Running, RunStatus::Succeeded]
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_exhausted() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-run", JobScript::exits(1)));
    let sink = Arc::new(RecordingSink::default());
    let descriptor = job("dbt-run").with_retry(2, 0);

    let run = runner(backend.clone(), sink)
        .run(Uuid::new_v4(), 0, &descriptor, &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_reason, Some(ExitReason::NonZeroExit));
    assert_eq!(run.attempts, 2);
    assert_eq!(backend.launch_count("dbt-run"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_lost_task_is_launch_error() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-run", JobScript::vanishes()));
    let sink = Arc::new(RecordingSink::default());

    let run = runner(backend.clone(), sink)
        .run(Uuid::new_v4(), 0, &job("dbt-run"), &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.exit_reason, Some(ExitReason::LaunchError));
    assert!(run.diagnostic.unwrap().contains("lost track"));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_task_without_retry() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-run", JobScript::hangs()));
    let sink = Arc::new(RecordingSink::default());
    let descriptor = job("dbt-run").with_retry(3, 0);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let run = runner(backend.clone(), sink)
        .run(Uuid::new_v4(), 0, &descriptor, &ConfigBinding::new(), &cancel)
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_reason, Some(ExitReason::Cancelled));
    assert_eq!(run.attempts, 1);
    assert_eq!(backend.cancel_count("dbt-run"), 1);
    assert_eq!(backend.launch_count("dbt-run"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_launch() {
    let backend = Arc::new(ScriptedBackend::new());
    let sink = Arc::new(RecordingSink::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let run = runner(backend.clone(), sink)
        .run(Uuid::new_v4(), 0, &job("dbt-run"), &ConfigBinding::new(), &cancel)
        .await;

    assert_eq!(run.exit_reason, Some(ExitReason::Cancelled));
    assert_eq!(backend.launch_count("dbt-run"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_binding_reaches_container_env() {
    let backend = Arc::new(ScriptedBackend::new());
    let sink = Arc::new(RecordingSink::default());

    let mut binding = ConfigBinding::new();
    binding.insert("DBT_PROFILES_YML_SECRET_NAME", "prod/dbt/profiles");
    binding.insert("DBT_PRIVATE_KEY_SECRET_NAME", "prod/dbt/key");

    runner(backend.clone(), sink)
        .run(Uuid::new_v4(), 0, &job("dbt-run"), &binding, &CancellationToken::new())
        .await;

    let envs = backend.launched_env("dbt-run");
    assert_eq!(envs.len(), 1);
    assert_eq!(envs[0], binding);
}

#[tokio::test(start_paused = true)]
async fn test_sink_failures_do_not_change_outcome() {
    let backend = Arc::new(ScriptedBackend::new().script("dbt-test", JobScript::exits(1)));
    let runner = JobRunner::new(backend, Arc::new(BrokenSink), fast_config());

    let run = runner
        .run(Uuid::new_v4(), 0, &job("dbt-test"), &ConfigBinding::new(), &CancellationToken::new())
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_reason, Some(ExitReason::NonZeroExit));
}
