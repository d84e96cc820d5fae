//! Runner configuration
//!
//! Polling, deadline and admission tuning for the job runner. Defaults suit a
//! single-host podman deployment; tests shrink the intervals.

use std::time::Duration;
use tandem_core::domain::descriptor::MAX_TIMEOUT_SECONDS;

/// Job runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How often the backend is polled for task state
    pub poll_interval: Duration,

    /// Deadline used when a descriptor does not declare `timeout_seconds`
    pub default_timeout: Duration,

    /// Total launch attempts when the backend rejects admission
    pub max_admission_attempts: u32,

    /// Delay before the first admission retry; doubles on each rejection
    pub admission_backoff: Duration,

    /// Upper bound for the admission backoff
    pub max_admission_backoff: Duration,

    /// Consecutive poll errors tolerated before the task is considered lost
    pub max_poll_errors: u32,
}

impl RunnerConfig {
    /// Creates a configuration with defaults
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            default_timeout: Duration::from_secs(300), // 5 minutes
            max_admission_attempts: 5,
            admission_backoff: Duration::from_millis(500),
            max_admission_backoff: Duration::from_secs(30),
            max_poll_errors: 3,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - TANDEM_POLL_INTERVAL (seconds, default: 2)
    /// - TANDEM_JOB_TIMEOUT (seconds, default: 300)
    /// - TANDEM_ADMISSION_ATTEMPTS (default: 5)
    /// - TANDEM_ADMISSION_BACKOFF_MS (milliseconds, default: 500)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        let poll_interval = env_parse::<u64>("TANDEM_POLL_INTERVAL")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let default_timeout = env_parse::<u64>("TANDEM_JOB_TIMEOUT")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.default_timeout);

        let max_admission_attempts = env_parse::<u32>("TANDEM_ADMISSION_ATTEMPTS")?
            .unwrap_or(defaults.max_admission_attempts);

        let admission_backoff = env_parse::<u64>("TANDEM_ADMISSION_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.admission_backoff);

        let config = Self {
            poll_interval,
            default_timeout,
            max_admission_attempts,
            admission_backoff,
            ..defaults
        };
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.default_timeout.is_zero() {
            anyhow::bail!("default_timeout must be greater than 0");
        }

        if self.default_timeout > Duration::from_secs(MAX_TIMEOUT_SECONDS) {
            anyhow::bail!(
                "default_timeout cannot exceed {} seconds",
                MAX_TIMEOUT_SECONDS
            );
        }

        if self.max_admission_attempts == 0 {
            anyhow::bail!("max_admission_attempts must be at least 1");
        }

        if self.max_poll_errors == 0 {
            anyhow::bail!("max_poll_errors must be at least 1");
        }

        if self.admission_backoff > self.max_admission_backoff {
            anyhow::bail!("admission_backoff cannot exceed max_admission_backoff");
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads and parses an optional environment variable
///
/// Unset means `None`; a set but unparsable value is an error rather than a
/// silent fallback to the default.
fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        Err(_) => Ok(None),
    }
}
