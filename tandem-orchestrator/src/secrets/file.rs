//! Mounted-secrets directory provider
//!
//! One file per key, named exactly like the key. A single trailing newline
//! is stripped, matching what `echo` and most secret mounts produce.

use async_trait::async_trait;
use std::path::PathBuf;
use tandem_core::{OrchestrationError, Result};

use super::SecretProvider;

#[derive(Debug, Clone)]
pub struct FileSecretProvider {
    directory: PathBuf,
}

impl FileSecretProvider {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl SecretProvider for FileSecretProvider {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(OrchestrationError::Provider(format!(
                "'{}' cannot be used as a secret file name",
                key
            )));
        }

        let path = self.directory.join(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(strip_trailing_newline(contents))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OrchestrationError::Provider(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

fn strip_trailing_newline(mut value: String) -> String {
    if value.ends_with('\n') {
        value.pop();
        if value.ends_with('\r') {
            value.pop();
        }
    }
    value
}
