//! Job descriptor domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{OrchestrationError, Result};

/// Default cpu units for a job (1024 units = 1 vCPU)
pub const DEFAULT_CPU_UNITS: u32 = 256;

/// Default memory for a job in MiB
pub const DEFAULT_MEMORY_MB: u32 = 512;

/// Longest deadline a step may declare (7 days)
pub const MAX_TIMEOUT_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Immutable definition of a runnable job step
///
/// Registered once in the descriptor store and shared read-only by every
/// invocation that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    pub container_image: String,
    #[serde(default)]
    pub command_args: Vec<String>,
    #[serde(default = "default_cpu_units")]
    pub cpu_units: u32,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,
    /// Configuration keys that must resolve before the job may launch
    #[serde(default)]
    pub required_config_keys: BTreeSet<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Overrides the runner's default run deadline
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Retry policy consulted by the job runner before reporting `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between attempts, doubled after every failed attempt
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }
}

fn default_cpu_units() -> u32 {
    DEFAULT_CPU_UNITS
}

fn default_memory_mb() -> u32 {
    DEFAULT_MEMORY_MB
}

impl JobDescriptor {
    /// Creates a descriptor with default resources and no required keys
    pub fn new(
        id: impl Into<String>,
        container_image: impl Into<String>,
        command_args: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            container_image: container_image.into(),
            command_args,
            cpu_units: DEFAULT_CPU_UNITS,
            memory_mb: DEFAULT_MEMORY_MB,
            required_config_keys: BTreeSet::new(),
            retry: RetryPolicy::default(),
            timeout_seconds: None,
        }
    }

    /// Adds a required configuration key
    pub fn with_required_key(mut self, key: impl Into<String>) -> Self {
        self.required_config_keys.insert(key.into());
        self
    }

    pub fn with_resources(mut self, cpu_units: u32, memory_mb: u32) -> Self {
        self.cpu_units = cpu_units;
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.retry = RetryPolicy {
            max_attempts,
            backoff_ms,
        };
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Validates the descriptor before registration
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(OrchestrationError::invalid(
                &self.id,
                "job id cannot be empty",
            ));
        }

        if self.container_image.trim().is_empty() {
            return Err(OrchestrationError::invalid(
                &self.id,
                "container image cannot be empty",
            ));
        }

        if self.cpu_units == 0 || self.memory_mb == 0 {
            return Err(OrchestrationError::invalid(
                &self.id,
                "cpu units and memory must be greater than 0",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(OrchestrationError::invalid(
                &self.id,
                "retry.max_attempts must be at least 1",
            ));
        }

        if self.timeout_seconds == Some(0) {
            return Err(OrchestrationError::invalid(
                &self.id,
                "timeout must be greater than 0",
            ));
        }

        if self.timeout_seconds.is_some_and(|t| t > MAX_TIMEOUT_SECONDS) {
            return Err(OrchestrationError::invalid(
                &self.id,
                format!("timeout cannot exceed {} seconds", MAX_TIMEOUT_SECONDS),
            ));
        }

        if let Some(key) = self
            .required_config_keys
            .iter()
            .find(|key| key.trim().is_empty() || key.contains('='))
        {
            return Err(OrchestrationError::invalid(
                &self.id,
                format!("invalid configuration key '{}'", key),
            ));
        }

        Ok(())
    }
}
