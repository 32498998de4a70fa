//! Client configuration.
//!
//! Values come from the provider configuration block first and fall back to
//! the `FASTLY_API_KEY` / `FASTLY_API_URL` environment variables.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ProviderError, Result};

/// Default Fastly control-plane endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.fastly.com";

/// Environment variable holding the API token.
pub const API_KEY_ENV: &str = "FASTLY_API_KEY";

/// Environment variable overriding the API endpoint.
pub const BASE_URL_ENV: &str = "FASTLY_API_URL";

/// Connection settings for [`crate::client::FastlyClient`].
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// API token sent as `Fastly-Key`.
    #[serde(default)]
    pub api_key: String,
    /// Base URL, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
        }
    }
}

// The token never shows up in logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ClientConfig {
    /// Create a config for the given token against the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Point the client at another endpoint (used by tests and proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Read the config purely from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_value(&Value::Null)
    }

    /// Build a config from the JSON provider configuration.
    ///
    /// Empty or missing values are filled from the environment. A missing API
    /// key after both lookups is a configuration error.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut config: ClientConfig = match value {
            Value::Null => ClientConfig::default(),
            v => serde_json::from_value(v.clone())
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
        };

        if config.api_key.is_empty() {
            config.api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        }
        if value.get("base_url").is_none() {
            if let Ok(url) = std::env::var(BASE_URL_ENV) {
                config.base_url = url;
            }
        }
        config.base_url = config.base_url.trim_end_matches('/').to_string();

        if config.api_key.is_empty() {
            return Err(ProviderError::Configuration(format!(
                "no API key given; set `api_key` or {}",
                API_KEY_ENV
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("token");
        assert_eq!(config.api_key, "token");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_from_value_explicit() {
        let config = ClientConfig::from_value(&json!({
            "api_key": "abc",
            "base_url": "http://127.0.0.1:8080/"
        }))
        .unwrap();
        assert_eq!(config.api_key, "abc");
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_from_value_rejects_wrong_types() {
        let err = ClientConfig::from_value(&json!({"api_key": 42})).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", ClientConfig::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_with_base_url_trims_slash() {
        let config = ClientConfig::new("k").with_base_url("http://localhost:1234/");
        assert_eq!(config.base_url, "http://localhost:1234");
    }
}
