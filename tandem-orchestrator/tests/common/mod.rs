#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tandem_core::Result;
use tandem_core::domain::descriptor::JobDescriptor;
use tandem_core::domain::pipeline::PipelineDefinition;
use tandem_orchestrator::secrets::{ConfigResolver, SecretProvider, StaticSecretProvider};
use tandem_orchestrator::tracker::MemoryRunTracker;
use tandem_orchestrator::{DescriptorStore, PipelineExecutor};
use tandem_runner::RunnerConfig;
use tandem_runner::backend::ScriptedBackend;

pub const DBT_IMAGE: &str = "andrewwlane/dockerized-dbt-with-secrets-manager:latest";

/// Provider that counts how often it is asked
pub struct CountingProvider {
    inner: StaticSecretProvider,
    queries: AtomicUsize,
}

impl CountingProvider {
    pub fn new(inner: StaticSecretProvider) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretProvider for CountingProvider {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }
}

pub struct Harness {
    pub store: Arc<DescriptorStore>,
    pub backend: Arc<ScriptedBackend>,
    pub tracker: Arc<MemoryRunTracker>,
    pub provider: Arc<CountingProvider>,
    pub executor: Arc<PipelineExecutor>,
}

pub fn runner_config() -> RunnerConfig {
    RunnerConfig {
        poll_interval: Duration::from_secs(2),
        default_timeout: Duration::from_secs(300),
        max_admission_attempts: 5,
        admission_backoff: Duration::from_millis(100),
        max_admission_backoff: Duration::from_secs(1),
        max_poll_errors: 3,
    }
}

/// Both dbt secret-name keys resolvable
pub fn dbt_secrets() -> StaticSecretProvider {
    StaticSecretProvider::new()
        .with("DBT_PROFILES_YML_SECRET_NAME", "prod/dbt/profiles")
        .with("DBT_PRIVATE_KEY_SECRET_NAME", "prod/dbt/private-key")
}

pub fn dbt_job(id: &str, command: &str) -> JobDescriptor {
    JobDescriptor::new(id, DBT_IMAGE, vec![command.to_string()])
        .with_required_key("DBT_PROFILES_YML_SECRET_NAME")
        .with_required_key("DBT_PRIVATE_KEY_SECRET_NAME")
}

pub fn harness(backend: ScriptedBackend, secrets: StaticSecretProvider) -> Harness {
    let store = Arc::new(DescriptorStore::new());
    let backend = Arc::new(backend);
    let tracker = Arc::new(MemoryRunTracker::new());
    let provider = Arc::new(CountingProvider::new(secrets));

    let executor = Arc::new(PipelineExecutor::new(
        store.clone(),
        ConfigResolver::new(provider.clone()),
        backend.clone(),
        tracker.clone(),
        runner_config(),
    ));

    Harness {
        store,
        backend,
        tracker,
        provider,
        executor,
    }
}

/// Registers the two-step dbt pipeline `dbt` = [dbt-run, dbt-test]
pub fn register_dbt(store: &DescriptorStore) {
    store.register(dbt_job("dbt-run", "run")).unwrap();
    store.register(dbt_job("dbt-test", "test")).unwrap();
    store
        .register_pipeline(PipelineDefinition::new(
            "dbt",
            vec!["dbt-run".to_string(), "dbt-test".to_string()],
        ))
        .unwrap();
}

/// Registers `chain` = [step-0, ..., step-(n-1)] with no required keys
pub fn register_chain(store: &DescriptorStore, steps: usize) {
    let ids: Vec<String> = (0..steps).map(|i| format!("step-{}", i)).collect();
    for id in &ids {
        store
            .register(JobDescriptor::new(id.clone(), "alpine:latest", Vec::new()))
            .unwrap();
    }
    store
        .register_pipeline(PipelineDefinition::new("chain", ids))
        .unwrap();
}
