//! HTTPS logging endpoints: the configured record, the API record, and the
//! list/create/delete calls scoped to a service version.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::{FastlyClient, RequestOptions, StatusResponse};
use crate::error::{ProviderError, Result};
use crate::types::ServiceVersionRef;

/// Default HTTP method of an endpoint.
pub const DEFAULT_METHOD: &str = "POST";
/// Default `json_format` (JSON formatting disabled).
pub const DEFAULT_JSON_FORMAT: &str = "0";
/// Default logging format version.
pub const DEFAULT_FORMAT_VERSION: i64 = 2;
/// Default message type.
pub const DEFAULT_MESSAGE_TYPE: &str = "blank";

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_json_format() -> String {
    DEFAULT_JSON_FORMAT.to_string()
}

fn default_format_version() -> i64 {
    DEFAULT_FORMAT_VERSION
}

fn default_message_type() -> String {
    DEFAULT_MESSAGE_TYPE.to_string()
}

/// One `httpslogging` block as written in configuration or stored in state.
///
/// Two configs are the same endpoint only if every field matches; `name` is the
/// key used to address the endpoint in API calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpsLoggingConfig {
    /// Unique name of the endpoint within the version.
    pub name: String,
    /// Destination URL; must be https.
    pub url: String,
    /// Most log lines per batch request; 0 means the API default.
    #[serde(default)]
    pub request_max_entries: i64,
    /// Most bytes per batch request; 0 means the API default.
    #[serde(default)]
    pub request_max_bytes: i64,
    /// Content-Type header sent with each batch.
    #[serde(default)]
    pub content_type: String,
    /// Name of an extra header sent with each batch.
    #[serde(default)]
    pub header_name: String,
    /// Value of the extra header.
    #[serde(default)]
    pub header_value: String,
    /// HTTP method, `POST` or `PUT`.
    #[serde(default = "default_method")]
    pub method: String,
    /// `"0"` plain, `"1"` JSON array, `"2"` newline-delimited JSON.
    #[serde(default = "default_json_format")]
    pub json_format: String,
    /// PEM CA certificate used to verify the destination.
    #[serde(default)]
    pub tls_ca_cert: String,
    /// PEM client certificate.
    #[serde(default)]
    pub tls_client_cert: String,
    /// PEM client private key.
    #[serde(default)]
    pub tls_client_key: String,
    /// Hostname expected on the destination certificate.
    #[serde(default)]
    pub tls_hostname: String,
    /// Apache-style log format string.
    #[serde(default)]
    pub format: String,
    /// Log format version, 1 or 2.
    #[serde(default = "default_format_version")]
    pub format_version: i64,
    /// Message framing: `classic`, `loggly`, `logplex` or `blank`.
    #[serde(default = "default_message_type")]
    pub message_type: String,
    /// Where the logging call goes in the generated VCL.
    #[serde(default)]
    pub placement: String,
    /// Name of the condition that gates logging.
    #[serde(default)]
    pub response_condition: String,
}

impl HttpsLoggingConfig {
    /// A config with the given identity and destination and defaults elsewhere.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            request_max_entries: 0,
            request_max_bytes: 0,
            content_type: String::new(),
            header_name: String::new(),
            header_value: String::new(),
            method: default_method(),
            json_format: default_json_format(),
            tls_ca_cert: String::new(),
            tls_client_cert: String::new(),
            tls_client_key: String::new(),
            tls_hostname: String::new(),
            format: String::new(),
            format_version: DEFAULT_FORMAT_VERSION,
            message_type: default_message_type(),
            placement: String::new(),
            response_condition: String::new(),
        }
    }

    /// Parse one block from its JSON form.
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| ProviderError::Validation(format!("invalid httpslogging block: {}", e)))
    }
}

/// Accepts `12`, `"12"` and `""`; the API is not consistent about it.
fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
        Null(()),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) if s.is_empty() => Ok(0),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        Raw::Null(()) => Ok(0),
    }
}

fn nullable_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// An HTTPS logging endpoint as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpsLogging {
    /// Service the endpoint belongs to.
    #[serde(deserialize_with = "nullable_string")]
    pub service_id: String,
    /// Service version.
    #[serde(deserialize_with = "lenient_u64")]
    pub version: u64,
    /// Unique name of the endpoint within the version.
    #[serde(deserialize_with = "nullable_string")]
    pub name: String,
    /// Destination URL; must be https.
    #[serde(deserialize_with = "nullable_string")]
    pub url: String,
    /// Most log lines per batch request; 0 means the API default.
    #[serde(deserialize_with = "lenient_u64")]
    pub request_max_entries: u64,
    /// Most bytes per batch request; 0 means the API default.
    #[serde(deserialize_with = "lenient_u64")]
    pub request_max_bytes: u64,
    /// Content-Type header sent with each batch.
    #[serde(deserialize_with = "nullable_string")]
    pub content_type: String,
    /// Name of an extra header sent with each batch.
    #[serde(deserialize_with = "nullable_string")]
    pub header_name: String,
    /// Value of the extra header.
    #[serde(deserialize_with = "nullable_string")]
    pub header_value: String,
    /// HTTP method, `POST` or `PUT`.
    #[serde(deserialize_with = "nullable_string")]
    pub method: String,
    /// `"0"` plain, `"1"` JSON array, `"2"` newline-delimited JSON.
    #[serde(deserialize_with = "nullable_string")]
    pub json_format: String,
    /// PEM CA certificate used to verify the destination.
    #[serde(deserialize_with = "nullable_string")]
    pub tls_ca_cert: String,
    /// PEM client certificate.
    #[serde(deserialize_with = "nullable_string")]
    pub tls_client_cert: String,
    /// PEM client private key.
    #[serde(deserialize_with = "nullable_string")]
    pub tls_client_key: String,
    /// Hostname expected on the destination certificate.
    #[serde(deserialize_with = "nullable_string")]
    pub tls_hostname: String,
    /// Apache-style log format string.
    #[serde(deserialize_with = "nullable_string")]
    pub format: String,
    /// Log format version, 1 or 2.
    #[serde(deserialize_with = "lenient_u64")]
    pub format_version: u64,
    /// Message framing: `classic`, `loggly`, `logplex` or `blank`.
    #[serde(deserialize_with = "nullable_string")]
    pub message_type: String,
    /// Where the logging call goes in the generated VCL.
    #[serde(deserialize_with = "nullable_string")]
    pub placement: String,
    /// Name of the condition that gates logging.
    #[serde(deserialize_with = "nullable_string")]
    pub response_condition: String,
}

impl HttpsLogging {
    /// Convert the record into the map stored in state.
    ///
    /// Empty strings and zero numbers are left out, so an unset field and a
    /// field explicitly set to its zero value read back the same.
    pub fn flatten(&self) -> Map<String, Value> {
        let strings = [
            ("name", &self.name),
            ("response_condition", &self.response_condition),
            ("format", &self.format),
            ("url", &self.url),
            ("content_type", &self.content_type),
            ("header_name", &self.header_name),
            ("header_value", &self.header_value),
            ("method", &self.method),
            ("json_format", &self.json_format),
            ("placement", &self.placement),
            ("tls_ca_cert", &self.tls_ca_cert),
            ("tls_client_cert", &self.tls_client_cert),
            ("tls_client_key", &self.tls_client_key),
            ("tls_hostname", &self.tls_hostname),
            ("message_type", &self.message_type),
        ];
        let numbers = [
            ("request_max_entries", self.request_max_entries),
            ("request_max_bytes", self.request_max_bytes),
            ("format_version", self.format_version),
        ];

        let mut map = Map::new();
        for (key, value) in strings {
            if !value.is_empty() {
                map.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        for (key, value) in numbers {
            if value != 0 {
                map.insert(key.to_string(), Value::from(value));
            }
        }
        map
    }
}

/// Flatten every record of a list response.
pub fn flatten_https(list: &[HttpsLogging]) -> Vec<Map<String, Value>> {
    list.iter().map(HttpsLogging::flatten).collect()
}

/// Input for [`LoggingApi::list_https`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListHttpsInput {
    /// Service ID.
    pub service: String,
    /// Service version.
    pub version: u64,
}

impl From<&ServiceVersionRef> for ListHttpsInput {
    fn from(scope: &ServiceVersionRef) -> Self {
        Self {
            service: scope.service_id.clone(),
            version: scope.version,
        }
    }
}

/// Input for [`LoggingApi::create_https`].
///
/// `service` and `version` address the endpoint; the remaining fields form
/// the JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateHttpsInput {
    /// Service ID.
    #[serde(skip)]
    pub service: String,
    /// Service version.
    #[serde(skip)]
    pub version: u64,
    /// Unique name of the endpoint within the version.
    pub name: String,
    /// Destination URL; must be https.
    pub url: String,
    /// Most log lines per batch request; 0 means the API default.
    pub request_max_entries: u64,
    /// Most bytes per batch request; 0 means the API default.
    pub request_max_bytes: u64,
    /// Content-Type header sent with each batch.
    pub content_type: String,
    /// Name of an extra header sent with each batch.
    pub header_name: String,
    /// Value of the extra header.
    pub header_value: String,
    /// HTTP method, `POST` or `PUT`.
    pub method: String,
    /// `"0"` plain, `"1"` JSON array, `"2"` newline-delimited JSON.
    pub json_format: String,
    /// PEM CA certificate used to verify the destination.
    pub tls_ca_cert: String,
    /// PEM client certificate.
    pub tls_client_cert: String,
    /// PEM client private key.
    pub tls_client_key: String,
    /// Hostname expected on the destination certificate.
    pub tls_hostname: String,
    /// Apache-style log format string.
    pub format: String,
    /// Log format version, 1 or 2.
    pub format_version: u32,
    /// Message framing: `classic`, `loggly`, `logplex` or `blank`.
    pub message_type: String,
    /// Where the logging call goes in the generated VCL.
    pub placement: String,
    /// Name of the condition that gates logging.
    pub response_condition: String,
}

fn unsigned<T: TryFrom<i64>>(field: &str, value: i64) -> Result<T> {
    T::try_from(value).map_err(|_| {
        ProviderError::Validation(format!(
            "'{}' must be a non-negative integer in range, got {}",
            field, value
        ))
    })
}

impl CreateHttpsInput {
    /// Build the create call for `config` in `scope`.
    ///
    /// Strings pass through verbatim; integers are converted to the API's
    /// unsigned representation and negative values are rejected.
    pub fn from_config(scope: &ServiceVersionRef, config: &HttpsLoggingConfig) -> Result<Self> {
        Ok(Self {
            service: scope.service_id.clone(),
            version: scope.version,
            name: config.name.clone(),
            url: config.url.clone(),
            request_max_entries: unsigned("request_max_entries", config.request_max_entries)?,
            request_max_bytes: unsigned("request_max_bytes", config.request_max_bytes)?,
            content_type: config.content_type.clone(),
            header_name: config.header_name.clone(),
            header_value: config.header_value.clone(),
            method: config.method.clone(),
            json_format: config.json_format.clone(),
            tls_ca_cert: config.tls_ca_cert.clone(),
            tls_client_cert: config.tls_client_cert.clone(),
            tls_client_key: config.tls_client_key.clone(),
            tls_hostname: config.tls_hostname.clone(),
            format: config.format.clone(),
            format_version: unsigned("format_version", config.format_version)?,
            message_type: config.message_type.clone(),
            placement: config.placement.clone(),
            response_condition: config.response_condition.clone(),
        })
    }
}

/// Input for [`LoggingApi::delete_https`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteHttpsInput {
    /// Service ID.
    pub service: String,
    /// Service version.
    pub version: u64,
    /// Unique name of the endpoint within the version.
    pub name: String,
}

impl DeleteHttpsInput {
    /// Build the delete call for `config` in `scope`.
    pub fn from_config(scope: &ServiceVersionRef, config: &HttpsLoggingConfig) -> Self {
        Self {
            service: scope.service_id.clone(),
            version: scope.version,
            name: config.name.clone(),
        }
    }
}

fn check_scope(service: &str, version: u64) -> Result<()> {
    if service.is_empty() {
        return Err(ProviderError::MissingRequiredField("service"));
    }
    if version == 0 {
        return Err(ProviderError::MissingRequiredField("version"));
    }
    Ok(())
}

fn collection_path(service: &str, version: u64) -> String {
    format!("/service/{}/version/{}/logging/https", service, version)
}

/// The logging calls the reconciler needs.
///
/// [`FastlyClient`] talks to the real API; tests plug in
/// [`crate::testing::RecordingApi`].
#[async_trait]
pub trait LoggingApi: Send + Sync {
    /// List every HTTPS endpoint of a service version.
    async fn list_https(&self, input: &ListHttpsInput) -> Result<Vec<HttpsLogging>>;

    /// Create an endpoint on a draft version.
    async fn create_https(&self, input: &CreateHttpsInput) -> Result<HttpsLogging>;

    /// Delete an endpoint from a draft version.
    async fn delete_https(&self, input: &DeleteHttpsInput) -> Result<()>;
}

#[async_trait]
impl LoggingApi for FastlyClient {
    async fn list_https(&self, input: &ListHttpsInput) -> Result<Vec<HttpsLogging>> {
        check_scope(&input.service, input.version)?;

        let path = collection_path(&input.service, input.version);
        self.request(Method::GET, &path, RequestOptions::default())
            .await
    }

    async fn create_https(&self, input: &CreateHttpsInput) -> Result<HttpsLogging> {
        check_scope(&input.service, input.version)?;
        if input.name.is_empty() {
            return Err(ProviderError::MissingRequiredField("name"));
        }

        let path = collection_path(&input.service, input.version);
        let options = RequestOptions::default().with_body(serde_json::to_value(input)?);
        self.request(Method::POST, &path, options).await
    }

    async fn delete_https(&self, input: &DeleteHttpsInput) -> Result<()> {
        check_scope(&input.service, input.version)?;
        if input.name.is_empty() {
            return Err(ProviderError::MissingRequiredField("name"));
        }

        let path = format!(
            "{}/{}",
            collection_path(&input.service, input.version),
            urlencoding::encode(&input.name)
        );
        let body = self
            .send(Method::DELETE, &path, RequestOptions::default())
            .await?;
        let ack: StatusResponse = serde_json::from_str(&body)?;
        if !ack.is_ok() {
            debug!(status = %ack.status, "delete not acknowledged");
            return Err(ProviderError::Api { status: 200, body });
        }
        Ok(())
    }
}
