//! Job descriptor endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use tandem_core::domain::descriptor::JobDescriptor;

impl OrchestratorClient {
    /// Register a job descriptor
    ///
    /// Fails with status 409 if the id is taken and 400 if the descriptor is
    /// invalid.
    pub async fn register_descriptor(&self, descriptor: &JobDescriptor) -> Result<JobDescriptor> {
        let url = format!("{}/descriptors", self.base_url);
        let response = self.client.post(&url).json(descriptor).send().await?;

        self.handle_response(response).await
    }

    pub async fn list_descriptors(&self) -> Result<Vec<JobDescriptor>> {
        let url = format!("{}/descriptors", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_descriptor(&self, id: &str) -> Result<JobDescriptor> {
        let url = format!("{}/descriptors/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
