//! Provider chain: first provider with a value wins

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_core::Result;

use super::{EnvSecretProvider, FileSecretProvider, SecretProvider};

#[derive(Clone, Default)]
pub struct ChainedSecretProvider {
    providers: Vec<Arc<dyn SecretProvider>>,
}

impl ChainedSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounted secret files (when a directory is given), then the environment
    pub fn from_sources(secrets_dir: Option<PathBuf>, env_prefix: &str) -> Self {
        let mut chain = Self::new();
        if let Some(dir) = secrets_dir {
            chain = chain.then(Arc::new(FileSecretProvider::new(dir)));
        }
        chain.then(Arc::new(EnvSecretProvider::with_prefix(env_prefix)))
    }

    pub fn then(mut self, provider: Arc<dyn SecretProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl SecretProvider for ChainedSecretProvider {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        for provider in &self.providers {
            if let Some(value) = provider.get(key).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
