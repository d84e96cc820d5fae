//! Pipeline definition endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use tandem_core::domain::pipeline::PipelineDefinition;

impl OrchestratorClient {
    /// Register a pipeline definition
    ///
    /// Every step must already be registered as a job descriptor.
    pub async fn register_pipeline(
        &self,
        definition: &PipelineDefinition,
    ) -> Result<PipelineDefinition> {
        let url = format!("{}/pipelines", self.base_url);
        let response = self.client.post(&url).json(definition).send().await?;

        self.handle_response(response).await
    }

    pub async fn list_pipelines(&self) -> Result<Vec<PipelineDefinition>> {
        let url = format!("{}/pipelines", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_pipeline(&self, id: &str) -> Result<PipelineDefinition> {
        let url = format!("{}/pipelines/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
