//! Tandem HTTP Client
//!
//! A small, typed client for the Tandem orchestrator API, shared by the CLI
//! and anything else that needs to start or inspect invocations remotely.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use tandem_client::OrchestratorClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tandem_client::ClientError> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let accepted = client.start_invocation("dbt", BTreeMap::new()).await?;
//!     println!("Started invocation: {}", accepted.invocation_id);
//!     Ok(())
//! }
//! ```

mod descriptors;
pub mod error;
mod invocations;
mod pipelines;

pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Tandem orchestrator API
///
/// Methods are grouped by resource:
/// - Job descriptors (register, list, get)
/// - Pipeline definitions (register, list, get)
/// - Invocations (start, get, history, cancel, list)
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use tandem_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// Use this to configure timeouts, proxies or TLS settings.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /health
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Checks the status code and deserializes the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Checks the status code of a response whose body is not needed
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::debug!("Orchestrator answered {}: {}", status, body);

        Err(ClientError::api_error(status.as_u16(), error_message(&body)))
    }
}

/// Extracts the message of an `{"error": "..."}` body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
