//! Error types for the Fastly provider.

use thiserror::Error;

/// Errors returned by the Fastly client, the reconciler and the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required input was empty; no request was sent.
    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    /// The request could not be sent or the response body could not be read.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-2xx status.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response body was not the JSON we expected.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The provider was used before `configure` succeeded.
    #[error("Provider not configured")]
    NotConfigured,

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),
}

impl ProviderError {
    /// HTTP status of an [`ProviderError::Api`] error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the API reported the target as absent (HTTP 404).
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Shorthand result type used across the crate.
pub type Result<T> = std::result::Result<T, ProviderError>;
