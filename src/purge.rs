//! Purge endpoints.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::client::{FastlyClient, RequestOptions};
use crate::error::{ProviderError, Result};

/// Request header that turns a purge into a soft purge.
pub const SOFT_PURGE_HEADER: &str = "Fastly-Soft-Purge";

/// Response to a purge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purge {
    /// Status of the purge, usually `"ok"`.
    #[serde(default)]
    pub status: String,
    /// Unique ID of the purge request.
    #[serde(default)]
    pub id: String,
}

/// Input for [`FastlyClient::purge`].
#[derive(Debug, Clone, Default)]
pub struct PurgeInput {
    /// The URL to purge (required).
    pub url: String,
    /// Mark content stale instead of evicting it.
    pub soft: bool,
}

/// Input for [`FastlyClient::purge_key`].
#[derive(Debug, Clone, Default)]
pub struct PurgeKeyInput {
    /// Service ID (required).
    pub service: String,
    /// Surrogate key to purge (required).
    pub key: String,
    /// Mark content stale instead of evicting it.
    pub soft: bool,
}

/// Input for [`FastlyClient::purge_all`].
#[derive(Debug, Clone, Default)]
pub struct PurgeAllInput {
    /// Service ID (required).
    pub service: String,
    /// Mark content stale instead of evicting it.
    pub soft: bool,
}

fn with_soft(options: RequestOptions, soft: bool) -> RequestOptions {
    if soft {
        options.with_header(SOFT_PURGE_HEADER, "1")
    } else {
        options
    }
}

impl FastlyClient {
    /// Purge a single URL.
    pub async fn purge(&self, input: &PurgeInput) -> Result<Purge> {
        if input.url.is_empty() {
            return Err(ProviderError::MissingRequiredField("url"));
        }

        let options = with_soft(RequestOptions::parallel(), input.soft);
        self.request(Method::POST, &format!("/purge/{}", input.url), options)
            .await
    }

    /// Purge every object of a service tagged with `key`.
    pub async fn purge_key(&self, input: &PurgeKeyInput) -> Result<Purge> {
        if input.service.is_empty() {
            return Err(ProviderError::MissingRequiredField("service"));
        }
        if input.key.is_empty() {
            return Err(ProviderError::MissingRequiredField("key"));
        }

        let path = format!("/service/{}/purge/{}", input.service, input.key);
        let options = with_soft(RequestOptions::parallel(), input.soft);
        self.request(Method::POST, &path, options).await
    }

    /// Purge everything cached for a service.
    pub async fn purge_all(&self, input: &PurgeAllInput) -> Result<Purge> {
        if input.service.is_empty() {
            return Err(ProviderError::MissingRequiredField("service"));
        }

        let path = format!("/service/{}/purge_all", input.service);
        let options = with_soft(RequestOptions::default(), input.soft);
        self.request(Method::POST, &path, options).await
    }
}
