//! Environment variable provider

use async_trait::async_trait;
use tandem_core::{OrchestrationError, Result};

use super::SecretProvider;

/// Reads `<prefix><KEY>` from the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider {
    prefix: String,
}

impl EnvSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn variable(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let name = self.variable(key);
        match std::env::var(&name) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(OrchestrationError::Provider(format!(
                "environment variable {} is not valid UTF-8",
                name
            ))),
        }
    }
}
