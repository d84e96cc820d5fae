//! Pipeline Definition API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tandem_core::domain::pipeline::PipelineDefinition;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /pipelines
/// Every step must reference a registered descriptor
pub async fn register_pipeline(
    State(state): State<AppState>,
    Json(definition): Json<PipelineDefinition>,
) -> ApiResult<(StatusCode, Json<PipelineDefinition>)> {
    tracing::info!("Registering pipeline definition: {}", definition.id);

    state.store.register_pipeline(definition.clone())?;

    Ok((StatusCode::CREATED, Json(definition)))
}

/// GET /pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> Json<Vec<PipelineDefinition>> {
    tracing::debug!("Listing pipeline definitions");
    Json(state.store.list_pipelines())
}

/// GET /pipelines/{id}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PipelineDefinition>> {
    tracing::debug!("Getting pipeline definition: {}", id);
    Ok(Json(state.store.pipeline(&id)?))
}
