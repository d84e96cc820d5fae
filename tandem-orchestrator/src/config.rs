//! Orchestrator configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use tandem_runner::RunnerConfig;

/// Orchestrator service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// SQLite URL of the audit database
    pub database_url: String,

    /// Manifest loaded into the descriptor store at startup
    pub manifest: Option<PathBuf>,

    /// Directory of mounted secret files, consulted before the environment
    pub secrets_dir: Option<PathBuf>,

    /// Prefix for configuration read from the environment
    pub env_prefix: String,

    /// Containers the podman backend admits at once
    pub max_tasks: usize,

    pub runner: RunnerConfig,
}

impl Config {
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://tandem.db".to_string(),
            manifest: None,
            secrets_dir: None,
            env_prefix: String::new(),
            max_tasks: 4,
            runner: RunnerConfig::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - TANDEM_BIND_ADDR (default: 0.0.0.0:8080)
    /// - DATABASE_URL (default: sqlite://tandem.db)
    /// - TANDEM_MANIFEST (path to a Lua manifest)
    /// - TANDEM_SECRETS_DIR (directory with one file per key)
    /// - TANDEM_ENV_PREFIX (default: empty)
    /// - TANDEM_MAX_TASKS (default: 4)
    /// - runner settings, see [`RunnerConfig::from_env`]
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        let max_tasks = match std::env::var("TANDEM_MAX_TASKS") {
            Ok(raw) => raw
                .parse::<usize>()
                .map_err(|e| anyhow::anyhow!("TANDEM_MAX_TASKS has an invalid value '{}': {}", raw, e))?,
            Err(_) => defaults.max_tasks,
        };

        let config = Self {
            bind_addr: std::env::var("TANDEM_BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            manifest: std::env::var_os("TANDEM_MANIFEST").map(PathBuf::from),
            secrets_dir: std::env::var_os("TANDEM_SECRETS_DIR").map(PathBuf::from),
            env_prefix: std::env::var("TANDEM_ENV_PREFIX").unwrap_or(defaults.env_prefix),
            max_tasks,
            runner: RunnerConfig::from_env()?,
        };
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("bind_addr '{}' is invalid: {}", self.bind_addr, e))?;

        if !self.database_url.starts_with("sqlite:") {
            anyhow::bail!("database_url must start with sqlite:");
        }

        if self.max_tasks == 0 {
            anyhow::bail!("max_tasks must be greater than 0");
        }

        self.runner.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
