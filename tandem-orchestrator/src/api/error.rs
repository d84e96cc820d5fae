//! API Error Handling
//!
//! Maps orchestration errors to HTTP statuses with a `{"error": message}` body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tandem_core::OrchestrationError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::NotFound(msg) | ApiError::Conflict(msg) | ApiError::BadRequest(msg) => msg,
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                msg
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<OrchestrationError> for ApiError {
    fn from(err: OrchestrationError) -> Self {
        let message = err.to_string();
        match err {
            OrchestrationError::NotFound { .. } => ApiError::NotFound(message),
            OrchestrationError::DuplicateId { .. } => ApiError::Conflict(message),
            OrchestrationError::MissingConfig { .. }
            | OrchestrationError::InvalidDefinition { .. }
            | OrchestrationError::InvalidTransition { .. } => ApiError::BadRequest(message),
            OrchestrationError::Provider(_)
            | OrchestrationError::Tracker(_)
            | OrchestrationError::Internal(_) => ApiError::InternalError(message),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
