//! HTTP plumbing shared by every Fastly API call.
//!
//! Each call builds a [`RequestOptions`] and goes through
//! [`FastlyClient::request`], which attaches authentication, sends the request,
//! maps non-2xx statuses to [`ProviderError::Api`] and decodes the JSON body.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{ProviderError, Result};

/// Header carrying the API token.
pub const API_KEY_HEADER: &str = "Fastly-Key";

const CLIENT_USER_AGENT: &str = concat!("fastly-provider/", env!("CARGO_PKG_VERSION"));

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// The request may run concurrently with other requests. Requests without
    /// this flag are serialised through the client's update lock.
    pub parallel: bool,
    /// Extra headers to send.
    pub headers: Vec<(&'static str, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl RequestOptions {
    /// Options for a request that is safe to run concurrently.
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Default::default()
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// `{"status": "ok"}` acknowledgement returned by delete endpoints.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Async client for the Fastly control-plane API.
pub struct FastlyClient {
    http: reqwest::Client,
    config: ClientConfig,
    update_lock: Mutex<()>,
}

impl std::fmt::Debug for FastlyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastlyClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FastlyClient {
    /// Build a client from the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        let mut key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| ProviderError::Configuration(format!("invalid API key: {}", e)))?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            config,
            update_lock: Mutex::new(()),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Send a request and return the raw body of a 2xx response.
    #[instrument(level = "debug", skip(self, options), fields(parallel = options.parallel))]
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<String> {
        let _guard = if options.parallel {
            None
        } else {
            Some(self.update_lock.lock().await)
        };

        let mut builder = self.http.request(method.clone(), self.url(path));
        for (name, value) in &options.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        debug!(%method, path, "sending request");
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), "received response");

        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Send a request and decode the JSON body of the response.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let body = self.send(method, path, options).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_joining() {
        let client =
            FastlyClient::new(ClientConfig::new("k").with_base_url("http://localhost:9/")).unwrap();
        assert_eq!(
            client.url("/service/abc/purge_all"),
            "http://localhost:9/service/abc/purge_all"
        );
        assert_eq!(client.url("purge/foo"), "http://localhost:9/purge/foo");
    }

    #[test]
    fn test_request_options_builders() {
        let opts = RequestOptions::parallel()
            .with_header("Fastly-Soft-Purge", "1")
            .with_body(json!({"name": "x"}));
        assert!(opts.parallel);
        assert_eq!(opts.headers, vec![("Fastly-Soft-Purge", "1".to_string())]);
        assert_eq!(opts.body, Some(json!({"name": "x"})));

        assert!(!RequestOptions::default().parallel);
    }

    #[test]
    fn test_invalid_api_key_rejected() {
        let err = FastlyClient::new(ClientConfig::new("bad\nkey")).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let client = FastlyClient::new(ClientConfig::new("secret-token")).unwrap();
        assert!(!format!("{:?}", client).contains("secret-token"));
    }

    #[test]
    fn test_status_response() {
        let ok: StatusResponse = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert!(ok.is_ok());
        let not_ok: StatusResponse = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert!(!not_ok.is_ok());
    }
}
