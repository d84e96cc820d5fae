//! Client errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The orchestrator could not be reached or the transfer failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The orchestrator answered with a non-success status
    ///
    /// `message` is the `error` field of the body when present.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// A success response whose body did not match the expected type
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Unknown descriptor, pipeline or invocation
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error is a client error (4xx status)
    ///
    /// The orchestrator answers 400 for missing configuration and invalid
    /// definitions, 404 for unknown ids and 409 for duplicates.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}
