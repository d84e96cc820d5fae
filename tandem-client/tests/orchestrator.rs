//! Client against an in-process orchestrator

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tandem_client::{ClientError, OrchestratorClient};
use tandem_core::domain::descriptor::JobDescriptor;
use tandem_core::domain::event::EventKind;
use tandem_core::domain::invocation::PipelineInvocation;
use tandem_core::domain::pipeline::PipelineDefinition;
use tandem_core::domain::run::RunStatus;
use tandem_orchestrator::api::{AppState, create_router};
use tandem_orchestrator::secrets::{ConfigResolver, StaticSecretProvider};
use tandem_orchestrator::tracker::MemoryRunTracker;
use tandem_orchestrator::{DescriptorStore, InvocationManager, PipelineExecutor};
use tandem_runner::RunnerConfig;
use tandem_runner::backend::{JobScript, ScriptedBackend};
use uuid::Uuid;

async fn spawn_orchestrator(backend: ScriptedBackend) -> OrchestratorClient {
    let provider = StaticSecretProvider::new().with("DBT_TARGET", "prod");
    let executor = Arc::new(PipelineExecutor::new(
        Arc::new(DescriptorStore::new()),
        ConfigResolver::new(Arc::new(provider)),
        Arc::new(backend),
        Arc::new(MemoryRunTracker::new()),
        RunnerConfig::default(),
    ));
    let manager = Arc::new(InvocationManager::new(executor));
    let app = create_router(AppState::new(manager));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    OrchestratorClient::new(format!("http://{}/", addr))
}

async fn register_dbt(client: &OrchestratorClient) {
    for (id, command) in [("dbt-run", "run"), ("dbt-test", "test")] {
        let descriptor = JobDescriptor::new(id, "ghcr.io/dbt-labs/dbt-postgres:1.8", vec![
            command.to_string(),
        ])
        .with_required_key("DBT_TARGET");
        client.register_descriptor(&descriptor).await.unwrap();
    }
    client
        .register_pipeline(&PipelineDefinition::new(
            "dbt",
            vec!["dbt-run".to_string(), "dbt-test".to_string()],
        ))
        .await
        .unwrap();
}

async fn wait_terminal(client: &OrchestratorClient, id: Uuid) -> PipelineInvocation {
    for _ in 0..100 {
        let invocation = client.get_invocation(id).await.unwrap();
        if invocation.overall_status.is_terminal() {
            return invocation;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("invocation {} did not finish", id);
}

#[tokio::test]
async fn test_health() {
    let client = spawn_orchestrator(ScriptedBackend::new()).await;
    client.health().await.unwrap();
}

#[tokio::test]
async fn test_registration_round_trip() {
    let client = spawn_orchestrator(ScriptedBackend::new()).await;
    register_dbt(&client).await;

    let descriptor = client.get_descriptor("dbt-run").await.unwrap();
    assert_eq!(descriptor.command_args, vec!["run".to_string()]);
    assert_eq!(client.list_descriptors().await.unwrap().len(), 2);

    let pipeline = client.get_pipeline("dbt").await.unwrap();
    assert_eq!(pipeline.len(), 2);
    assert_eq!(client.list_pipelines().await.unwrap().len(), 1);

    let err = client
        .register_descriptor(&descriptor)
        .await
        .unwrap_err();
    match err {
        ClientError::ApiError { status, message } => {
            assert_eq!(status, 409);
            assert!(message.contains("dbt-run"));
        }
        other => panic!("expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invocation_runs_to_completion() {
    let client = spawn_orchestrator(ScriptedBackend::new()).await;
    register_dbt(&client).await;

    let accepted = client.start_invocation("dbt", BTreeMap::new()).await.unwrap();
    let invocation = wait_terminal(&client, accepted.invocation_id).await;

    assert_eq!(invocation.overall_status, RunStatus::Succeeded);
    assert_eq!(invocation.runs.len(), 2);

    let history = client.history(accepted.invocation_id).await.unwrap();
    assert!(matches!(
        history.first().map(|e| &e.kind),
        Some(EventKind::InvocationStarted { steps: 2, .. })
    ));

    let summaries = client.list_invocations().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].invocation_id, accepted.invocation_id);
}

#[tokio::test]
async fn test_missing_configuration_is_client_error() {
    let client = spawn_orchestrator(ScriptedBackend::new()).await;
    client
        .register_descriptor(
            &JobDescriptor::new("load", "alpine:latest", Vec::new()).with_required_key("DBT_PASSWORD"),
        )
        .await
        .unwrap();
    client
        .register_pipeline(&PipelineDefinition::new("load", vec!["load".to_string()]))
        .await
        .unwrap();

    let err = client
        .start_invocation("load", BTreeMap::new())
        .await
        .unwrap_err();
    assert!(err.is_client_error());
    assert!(err.to_string().contains("DBT_PASSWORD"));

    // An explicit input satisfies the key
    let config = BTreeMap::from([("DBT_PASSWORD".to_string(), "hunter2".to_string())]);
    let accepted = client.start_invocation("load", config).await.unwrap();
    let invocation = wait_terminal(&client, accepted.invocation_id).await;
    assert_eq!(invocation.overall_status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_cancel() {
    let backend = ScriptedBackend::new().script("dbt-run", JobScript::hangs());
    let client = spawn_orchestrator(backend).await;
    register_dbt(&client).await;

    let accepted = client.start_invocation("dbt", BTreeMap::new()).await.unwrap();
    client.cancel(accepted.invocation_id).await.unwrap();

    let invocation = wait_terminal(&client, accepted.invocation_id).await;
    assert_eq!(invocation.overall_status, RunStatus::Failed);
    assert_eq!(invocation.runs.len(), 1);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let client = spawn_orchestrator(ScriptedBackend::new()).await;

    assert!(client.get_invocation(Uuid::new_v4()).await.unwrap_err().is_not_found());
    assert!(client.cancel(Uuid::new_v4()).await.unwrap_err().is_not_found());
    assert!(client.get_pipeline("nope").await.unwrap_err().is_not_found());
    assert!(
        client
            .start_invocation("nope", BTreeMap::new())
            .await
            .unwrap_err()
            .is_not_found()
    );
}
