//! Subcommands and the connection options they share

pub mod flush;
pub mod get;
pub mod ping;
pub mod run;
pub mod update;

use anyhow::{Context, Result};
use clap::Args;
use esrollup_aggregator::{HttpBackend, RollupConfig};
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Search backend URL (default http://127.0.0.1:9200)
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Basic auth user name
    #[arg(long)]
    pub username: Option<String>,

    /// Basic auth password
    #[arg(long, env = "ESROLLUP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Request timeout (e.g., "30s", "2m")
    #[arg(long)]
    pub timeout: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl BackendArgs {
    /// Load configuration and apply the connection flags on top.
    pub fn load_config(&self) -> Result<RollupConfig> {
        let mut config = RollupConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(timeout) = &self.timeout {
            let timeout = esrollup_shared::utils::parse_duration(timeout)
                .context("Failed to parse timeout")?;
            config.request_timeout_secs = timeout.as_secs().max(1);
        }

        Ok(config)
    }
}

/// Build the HTTP backend described by `config`.
pub fn connect(config: &RollupConfig) -> Result<HttpBackend> {
    let backend = HttpBackend::new(&config.endpoint, config.request_timeout())
        .with_context(|| format!("Invalid endpoint {}", config.endpoint))?;
    Ok(match &config.username {
        Some(username) => backend.with_basic_auth(username.clone(), config.password.clone()),
        None => backend,
    })
}
