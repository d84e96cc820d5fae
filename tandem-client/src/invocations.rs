//! Invocation endpoints

use std::collections::BTreeMap;

use crate::OrchestratorClient;
use crate::error::Result;
use tandem_core::domain::event::RunEvent;
use tandem_core::domain::invocation::PipelineInvocation;
use tandem_core::dto::invocation::{InvocationAccepted, InvocationSummary, StartInvocation};
use uuid::Uuid;

impl OrchestratorClient {
    /// Start an invocation of a pipeline definition
    ///
    /// The orchestrator resolves every step's configuration before accepting,
    /// so missing keys surface here as a 400 error and nothing is launched.
    ///
    /// # Arguments
    /// * `definition_id` - The pipeline definition to run
    /// * `config` - Per-invocation inputs; these win over the orchestrator's providers
    pub async fn start_invocation(
        &self,
        definition_id: &str,
        config: BTreeMap<String, String>,
    ) -> Result<InvocationAccepted> {
        let url = format!("{}/invocations", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&StartInvocation {
                definition_id: definition_id.to_string(),
                config,
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get the latest snapshot of an invocation
    pub async fn get_invocation(&self, invocation_id: Uuid) -> Result<PipelineInvocation> {
        let url = format!("{}/invocations/{}", self.base_url, invocation_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List invocations, newest first
    pub async fn list_invocations(&self) -> Result<Vec<InvocationSummary>> {
        let url = format!("{}/invocations", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the ordered audit history of an invocation
    pub async fn history(&self, invocation_id: Uuid) -> Result<Vec<RunEvent>> {
        let url = format!("{}/invocations/{}/history", self.base_url, invocation_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Request cancellation of a running invocation
    ///
    /// Returns once the request is accepted; the running step is stopped
    /// asynchronously.
    pub async fn cancel(&self, invocation_id: Uuid) -> Result<()> {
        let url = format!("{}/invocations/{}/cancel", self.base_url, invocation_id);
        let response = self.client.post(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
