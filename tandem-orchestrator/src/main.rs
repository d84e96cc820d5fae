use anyhow::Context;
use std::sync::Arc;
use tandem_orchestrator::api::{self, AppState};
use tandem_orchestrator::config::Config;
use tandem_orchestrator::db;
use tandem_orchestrator::secrets::{ChainedSecretProvider, ConfigResolver};
use tandem_orchestrator::tracker::SqliteRunTracker;
use tandem_orchestrator::{DescriptorStore, InvocationManager, PipelineExecutor};
use tandem_runner::backend::{PodmanBackend, podman::check_podman_available};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem_orchestrator=info,tandem_runner=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tandem Orchestrator...");

    let config = Config::from_env().context("Invalid orchestrator configuration")?;

    tracing::info!("Opening audit database {}", config.database_url);

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    check_podman_available().await?;

    let store = Arc::new(DescriptorStore::new());
    if let Some(path) = &config.manifest {
        let manifest = tandem_lua::parse_manifest_file(path)?;
        let (jobs, pipelines) = store
            .load_manifest(manifest)
            .with_context(|| format!("Failed to load manifest {}", path.display()))?;
        tracing::info!(
            "Loaded {} job(s) and {} pipeline(s) from {}",
            jobs,
            pipelines,
            path.display()
        );
    }

    let provider = ChainedSecretProvider::from_sources(config.secrets_dir.clone(), &config.env_prefix);
    let executor = PipelineExecutor::new(
        store,
        ConfigResolver::new(Arc::new(provider)),
        Arc::new(PodmanBackend::new(config.max_tasks)),
        Arc::new(SqliteRunTracker::new(pool)),
        config.runner.clone(),
    );
    let manager = Arc::new(InvocationManager::new(Arc::new(executor)));

    // Build router with all API endpoints
    let app = api::create_router(AppState::new(manager.clone()));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let cancelled invocations stop their containers before exiting
    manager.shutdown().await;
    for invocation_id in manager.live_invocations().await {
        if let Err(e) = manager.wait(invocation_id).await {
            tracing::warn!("Invocation {} did not stop cleanly: {}", invocation_id, e);
        }
    }
    tracing::info!("Orchestrator stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
