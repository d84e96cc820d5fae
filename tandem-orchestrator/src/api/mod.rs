//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for one resource.

pub mod descriptor;
pub mod error;
pub mod health;
pub mod invocation;
pub mod pipeline;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::manager::InvocationManager;
use crate::store::DescriptorStore;
use crate::tracker::RunTracker;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DescriptorStore>,
    pub tracker: Arc<dyn RunTracker>,
    pub manager: Arc<InvocationManager>,
}

impl AppState {
    pub fn new(manager: Arc<InvocationManager>) -> Self {
        let executor = manager.executor();
        Self {
            store: executor.store().clone(),
            tracker: executor.tracker().clone(),
            manager,
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Descriptor endpoints
        .route(
            "/descriptors",
            post(descriptor::register_descriptor).get(descriptor::list_descriptors),
        )
        .route("/descriptors/{id}", get(descriptor::get_descriptor))
        // Pipeline endpoints
        .route(
            "/pipelines",
            post(pipeline::register_pipeline).get(pipeline::list_pipelines),
        )
        .route("/pipelines/{id}", get(pipeline::get_pipeline))
        // Invocation endpoints
        .route(
            "/invocations",
            post(invocation::start_invocation).get(invocation::list_invocations),
        )
        .route("/invocations/{id}", get(invocation::get_invocation))
        .route("/invocations/{id}/history", get(invocation::get_history))
        .route("/invocations/{id}/cancel", post(invocation::cancel_invocation))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
