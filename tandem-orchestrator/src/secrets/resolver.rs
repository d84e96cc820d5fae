//! Config resolver with per-invocation caching

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tandem_core::domain::binding::{ConfigBinding, InvocationContext};
use tandem_core::{OrchestrationError, Result};
use tokio::sync::Mutex;

use super::SecretProvider;

/// Shared entry point; hands out one [`ScopedResolver`] per invocation
#[derive(Clone)]
pub struct ConfigResolver {
    provider: Arc<dyn SecretProvider>,
}

impl ConfigResolver {
    pub fn new(provider: Arc<dyn SecretProvider>) -> Self {
        Self { provider }
    }

    /// Starts the resolution scope of one invocation
    pub fn scope(&self, context: InvocationContext) -> ScopedResolver {
        ScopedResolver {
            provider: self.provider.clone(),
            context,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

/// Resolver bound to one invocation context
///
/// Each key is looked up in the context's explicit inputs first and then in
/// the provider. Provider answers (including "no value") are cached until the
/// scope is dropped, so a key is queried at most once per invocation.
pub struct ScopedResolver {
    provider: Arc<dyn SecretProvider>,
    context: InvocationContext,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl ScopedResolver {
    pub fn context(&self) -> &InvocationContext {
        &self.context
    }

    /// Resolves every key or fails listing all missing ones
    pub async fn resolve(&self, keys: &BTreeSet<String>) -> Result<ConfigBinding> {
        let mut cache = self.cache.lock().await;
        let mut binding = ConfigBinding::new();
        let mut missing = Vec::new();

        for key in keys {
            if let Some(value) = self.context.inputs.get(key) {
                binding.insert(key.clone(), value.clone());
                continue;
            }

            let value = match cache.get(key) {
                Some(cached) => cached.clone(),
                None => {
                    tracing::debug!(
                        "Querying provider for {} (invocation {})",
                        key,
                        self.context.invocation_id
                    );
                    let value = self.provider.get(key).await?;
                    cache.insert(key.clone(), value.clone());
                    value
                }
            };

            match value {
                Some(value) => binding.insert(key.clone(), value),
                None => missing.push(key.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(OrchestrationError::MissingConfig { keys: missing });
        }

        Ok(binding)
    }
}
