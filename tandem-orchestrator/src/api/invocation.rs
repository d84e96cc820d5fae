//! Invocation API Handlers
//!
//! Starting, inspecting and cancelling pipeline invocations.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tandem_core::domain::event::RunEvent;
use tandem_core::domain::invocation::PipelineInvocation;
use tandem_core::dto::invocation::{InvocationAccepted, InvocationSummary, StartInvocation};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /invocations
/// Validates and resolves configuration synchronously, then runs in the background
pub async fn start_invocation(
    State(state): State<AppState>,
    Json(req): Json<StartInvocation>,
) -> ApiResult<(StatusCode, Json<InvocationAccepted>)> {
    tracing::info!("Starting invocation of pipeline: {}", req.definition_id);

    let invocation_id = state.manager.start(&req.definition_id, req.config).await?;

    Ok((StatusCode::ACCEPTED, Json(InvocationAccepted { invocation_id })))
}

/// GET /invocations
pub async fn list_invocations(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<InvocationSummary>>> {
    tracing::debug!("Listing invocations");

    let invocations = state.tracker.list_invocations().await?;

    Ok(Json(invocations.into_iter().map(Into::into).collect()))
}

/// GET /invocations/{id}
pub async fn get_invocation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineInvocation>> {
    tracing::debug!("Getting invocation: {}", id);
    Ok(Json(state.tracker.invocation(id).await?))
}

/// GET /invocations/{id}/history
/// Rejected invocations have a history but no snapshot
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<RunEvent>>> {
    tracing::debug!("Getting history of invocation: {}", id);

    let history = state.tracker.history(id).await?;
    if history.is_empty() {
        // 404 for ids that were never seen
        state.tracker.invocation(id).await?;
    }

    Ok(Json(history))
}

/// POST /invocations/{id}/cancel
pub async fn cancel_invocation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Cancelling invocation: {}", id);

    state.manager.cancel(id).await?;

    Ok(StatusCode::ACCEPTED)
}
