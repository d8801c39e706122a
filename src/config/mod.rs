// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{GatewayError, Result};
use config::{Config, Environment, File};
use std::path::Path;

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. CLI arguments (highest, applied by the caller)
    /// 2. Environment variables (`VELVET_UPSTREAM__API_TOKEN`, ...)
    /// 3. Config file
    /// 4. Defaults (lowest)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(&Self::default_config_path()).required(false),
        };

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // Load from config file if it exists
            .add_source(file)
            // Override with environment variables (prefix: VELVET_)
            .add_source(
                Environment::with_prefix("VELVET")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| GatewayError::Config(e.to_string()))
    }

    fn default_config_path() -> String {
        app_home().join("config.toml").to_string_lossy().to_string()
    }
}

impl UpstreamConfig {
    /// Both the account and the token are needed before any upstream call.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let account = self
            .account_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| GatewayError::Config("upstream account_id is not set".to_string()))?;
        let token = self
            .api_token
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| GatewayError::Config("upstream api_token is not set".to_string()))?;
        Ok((account, token))
    }
}
