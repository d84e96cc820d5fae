//! Secrets/Config resolution
//!
//! A [`SecretProvider`] answers `get(key)` from some external source. The
//! [`ConfigResolver`] turns a set of required keys plus an invocation context
//! into a [`ConfigBinding`](tandem_core::domain::binding::ConfigBinding),
//! caching provider answers for the lifetime of one invocation.

pub mod chained;
pub mod env;
pub mod file;
pub mod resolver;

use async_trait::async_trait;
use std::collections::HashMap;
use tandem_core::Result;

pub use chained::ChainedSecretProvider;
pub use env::EnvSecretProvider;
pub use file::FileSecretProvider;
pub use resolver::{ConfigResolver, ScopedResolver};

/// External secret/config source
///
/// `Ok(None)` means the key has no value. `Err` is reserved for failures of
/// the provider itself and is never turned into a missing key.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Provider backed by a fixed in-memory map
#[derive(Debug, Clone, Default)]
pub struct StaticSecretProvider {
    values: HashMap<String, String>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl FromIterator<(String, String)> for StaticSecretProvider {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }
}
