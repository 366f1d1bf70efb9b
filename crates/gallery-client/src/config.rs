//! Client configuration loading
//!
//! Loaded from a TOML file with validation, or constructed directly (tests
//! point the URLs at a mock server). The OAuth client ID is a public
//! identifier, not a secret; actual credentials never appear in config.

use serde::Deserialize;
use std::path::Path;

/// Configuration for the gallery API client and identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// OpenID-Connect token endpoint of the identity provider
    pub token_url: String,
    /// Base URL of the gallery backend API
    pub api_base_url: String,
    /// Public OAuth client identifier
    pub client_id: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        for (name, url) in [
            ("token_url", &self.token_url),
            ("api_base_url", &self.api_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::InvalidConfig {
                    field: name,
                    reason: format!("must start with http:// or https://, got: {url}"),
                });
            }
        }

        if self.client_id.is_empty() {
            return Err(common::Error::InvalidConfig {
                field: "client_id",
                reason: "must not be empty".into(),
            });
        }

        if self.timeout_secs == 0 {
            return Err(common::Error::InvalidConfig {
                field: "timeout_secs",
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}
