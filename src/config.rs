//! Client configuration from the environment or a YAML file.
use std::env;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable holding the decryption API endpoint.
pub const ENV_API_URL: &str = "RSWIDEVINE_KEYS_API_URL";
/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "RSWIDEVINE_KEYS_API_KEY";
/// Optional user agent override.
pub const ENV_USER_AGENT: &str = "RSWIDEVINE_KEYS_USER_AGENT";

/// Settings needed to build a [`Client`](crate::client::Client).
///
/// ```yaml
/// api_url: https://decrypt.example/api/wv
/// api_key: 0123456789abcdef
/// user_agent: my-tool/1.0   # optional
/// system_proxy: false        # optional, ignore HTTP(S)_PROXY
/// ```
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_key: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Honour proxy environment variables.
    #[serde(default = "default_system_proxy")]
    pub system_proxy: bool,
}

fn default_system_proxy() -> bool {
    true
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("system_proxy", &self.system_proxy)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{} is not set", name)))
        };

        let config = Self {
            api_url: required(ENV_API_URL)?,
            api_key: required(ENV_API_KEY)?,
            user_agent: lookup(ENV_USER_AGENT).filter(|v| !v.trim().is_empty()),
            system_proxy: true,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.api_url)
            .map_err(|e| Error::Config(format!("api_url '{}' is invalid: {}", self.api_url, e)))?;
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("api_key must not be empty".to_string()));
        }
        Ok(())
    }
}
