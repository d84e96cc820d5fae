//! Job Descriptor API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tandem_core::domain::descriptor::JobDescriptor;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /descriptors
pub async fn register_descriptor(
    State(state): State<AppState>,
    Json(descriptor): Json<JobDescriptor>,
) -> ApiResult<(StatusCode, Json<JobDescriptor>)> {
    tracing::info!("Registering job descriptor: {}", descriptor.id);

    state.store.register(descriptor.clone())?;

    Ok((StatusCode::CREATED, Json(descriptor)))
}

/// GET /descriptors
pub async fn list_descriptors(State(state): State<AppState>) -> Json<Vec<JobDescriptor>> {
    tracing::debug!("Listing job descriptors");
    Json(state.store.list())
}

/// GET /descriptors/{id}
pub async fn get_descriptor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobDescriptor>> {
    tracing::debug!("Getting job descriptor: {}", id);
    Ok(Json(state.store.get(&id)?))
}
