//! `fastly_service_v1` with its `httpslogging` blocks.
//!
//! Only the logging endpoints are managed here. Creating, cloning and
//! activating service versions is the orchestrator's job: the resource state
//! carries the service `id`, the draft `version` to write to and the
//! `active_version` to read from.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::FastlyClient;
use crate::config::ClientConfig;
use crate::error::{ProviderError, Result};
use crate::https_logging::{
    LoggingApi, DEFAULT_FORMAT_VERSION, DEFAULT_JSON_FORMAT, DEFAULT_MESSAGE_TYPE, DEFAULT_METHOD,
};
use crate::reconcile::{self, ConfigSet};
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, ProviderSchema, Schema};
use crate::service::ProviderService;
use crate::types::{AttributeChange, PlanResult, ServiceVersionRef};

/// Resource type served by this provider.
pub const SERVICE_RESOURCE: &str = "fastly_service_v1";

/// Name of the logging block inside the service resource.
pub const HTTPS_LOGGING_BLOCK: &str = "httpslogging";

/// Accepted `method` values.
pub const METHODS: [&str; 2] = ["POST", "PUT"];
/// Accepted `json_format` values: disabled, JSON array, newline-delimited JSON.
pub const JSON_FORMATS: [&str; 3] = ["0", "1", "2"];
/// Accepted `format_version` values.
pub const FORMAT_VERSIONS: [i64; 2] = [1, 2];
/// Accepted `message_type` values.
pub const MESSAGE_TYPES: [&str; 4] = ["classic", "loggly", "logplex", "blank"];
/// Accepted `placement` values.
pub const PLACEMENTS: [&str; 2] = ["none", "waf_debug"];

/// Schema of one `httpslogging` block.
pub fn https_logging_block() -> Block {
    Block::new()
        .with_description("An HTTPS endpoint that receives log lines")
        .with_attribute(
            "name",
            Attribute::required_string().with_description("Unique name of the endpoint"),
        )
        .with_attribute(
            "url",
            Attribute::required_string()
                .with_description("Destination of the log data; must be https")
                .with_prefix("https://"),
        )
        .with_attribute(
            "request_max_entries",
            Attribute::optional_int64()
                .with_description("Most log lines per request")
                .with_minimum(0),
        )
        .with_attribute(
            "request_max_bytes",
            Attribute::optional_int64()
                .with_description("Most bytes per request")
                .with_minimum(0),
        )
        .with_attribute(
            "content_type",
            Attribute::optional_string().with_description("Content-Type of the request"),
        )
        .with_attribute(
            "header_name",
            Attribute::optional_string().with_description("Name of a custom request header"),
        )
        .with_attribute(
            "header_value",
            Attribute::optional_string().with_description("Value of the custom request header"),
        )
        .with_attribute(
            "method",
            Attribute::optional_string()
                .with_default(json!(DEFAULT_METHOD))
                .one_of(METHODS),
        )
        .with_attribute(
            "json_format",
            Attribute::optional_string()
                .with_description("0 = plain, 1 = JSON array, 2 = newline-delimited JSON")
                .with_default(json!(DEFAULT_JSON_FORMAT))
                .one_of(JSON_FORMATS),
        )
        .with_attribute(
            "tls_ca_cert",
            Attribute::optional_string()
                .with_description("PEM CA certificate used to verify the server")
                .sensitive(),
        )
        .with_attribute(
            "tls_client_cert",
            Attribute::optional_string()
                .with_description("PEM client certificate")
                .sensitive(),
        )
        .with_attribute(
            "tls_client_key",
            Attribute::optional_string()
                .with_description("PEM client private key")
                .sensitive(),
        )
        .with_attribute(
            "tls_hostname",
            Attribute::optional_string()
                .with_description("Hostname (CN or SAN) expected on the server certificate"),
        )
        .with_attribute(
            "format",
            Attribute::optional_string().with_description("Apache-style log format string"),
        )
        .with_attribute(
            "format_version",
            Attribute::optional_int64()
                .with_default(json!(DEFAULT_FORMAT_VERSION))
                .one_of(FORMAT_VERSIONS),
        )
        .with_attribute(
            "message_type",
            Attribute::optional_string()
                .with_default(json!(DEFAULT_MESSAGE_TYPE))
                .one_of(MESSAGE_TYPES),
        )
        .with_attribute(
            "placement",
            Attribute::optional_string()
                .with_description("Where in the generated VCL the logging call goes")
                .one_of(PLACEMENTS),
        )
        .with_attribute(
            "response_condition",
            Attribute::optional_string().with_description("Name of the condition to apply"),
        )
}

/// Schema of the `fastly_service_v1` resource.
pub fn service_schema() -> Schema {
    Schema::v0()
        .with_attribute(
            "id",
            Attribute::required_string().with_description("Service ID"),
        )
        .with_attribute(
            "version",
            Attribute::optional_int64().with_description("Draft version that changes go to"),
        )
        .with_attribute(
            "active_version",
            Attribute::optional_int64().with_description("Version currently serving traffic"),
        )
        .with_block(HTTPS_LOGGING_BLOCK, NestedBlock::set(https_logging_block()))
}

/// Schema of the provider configuration block.
pub fn provider_config_schema() -> Schema {
    Schema::v0()
        .with_attribute(
            "api_key",
            Attribute::optional_string()
                .with_description("Fastly API token; falls back to FASTLY_API_KEY")
                .sensitive(),
        )
        .with_attribute(
            "base_url",
            Attribute::optional_string().with_description("API endpoint; falls back to FASTLY_API_URL"),
        )
}

fn check_resource_type(resource_type: &str) -> Result<()> {
    if resource_type == SERVICE_RESOURCE {
        Ok(())
    } else {
        Err(ProviderError::UnknownResource(resource_type.to_string()))
    }
}

fn service_id(state: &Value) -> Result<&str> {
    state
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(ProviderError::MissingRequiredField("id"))
}

fn version_field(state: &Value, field: &str) -> Option<u64> {
    state.get(field).and_then(Value::as_u64).filter(|v| *v > 0)
}

/// Version that mutations are written to: the draft, else the active one.
fn draft_scope(state: &Value) -> Result<ServiceVersionRef> {
    let version = version_field(state, "version")
        .or_else(|| version_field(state, "active_version"))
        .ok_or(ProviderError::MissingRequiredField("version"))?;
    Ok(ServiceVersionRef::new(service_id(state)?, version))
}

fn logging_set(state: &Value) -> Result<ConfigSet> {
    ConfigSet::from_value(state.get(HTTPS_LOGGING_BLOCK))
}

/// Provider for Fastly services.
pub struct FastlyProvider {
    api: RwLock<Option<Arc<dyn LoggingApi>>>,
}

impl Default for FastlyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FastlyProvider {
    /// An unconfigured provider; call [`ProviderService::configure`] first.
    pub fn new() -> Self {
        Self {
            api: RwLock::new(None),
        }
    }

    /// A provider that talks to `api` without going through `configure`.
    pub fn with_api(api: Arc<dyn LoggingApi>) -> Self {
        Self {
            api: RwLock::new(Some(api)),
        }
    }

    async fn api(&self) -> Result<Arc<dyn LoggingApi>> {
        self.api.read().await.clone().ok_or(ProviderError::NotConfigured)
    }

    async fn apply(
        &self,
        scope: &ServiceVersionRef,
        old: &ConfigSet,
        new: &ConfigSet,
    ) -> Result<()> {
        let api = self.api().await?;
        let report = reconcile::reconcile(api.as_ref(), scope, old, new).await?;
        debug!(%scope, ?report, "apply finished");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProviderService for FastlyProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(provider_config_schema())
            .with_resource(SERVICE_RESOURCE, service_schema())
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>> {
        let diagnostics = self.validate_provider_config(config.clone()).await?;
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }

        let client_config = match ClientConfig::from_value(&config) {
            Ok(c) => c,
            Err(ProviderError::Configuration(msg)) => {
                return Ok(vec![Diagnostic::error("Invalid provider configuration")
                    .with_detail(msg)
                    .with_attribute("api_key")]);
            },
            Err(err) => return Err(err),
        };

        info!(base_url = %client_config.base_url, "configuring Fastly client");
        let client: Arc<dyn LoggingApi> = Arc::new(FastlyClient::new(client_config)?);
        *self.api.write().await = Some(client);
        Ok(diagnostics)
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult> {
        check_resource_type(resource_type)?;

        let mut planned = proposed_state;
        service_schema().block.apply_defaults(&mut planned);

        let old = match &prior_state {
            Some(prior) => logging_set(prior)?,
            None => ConfigSet::new(),
        };
        let new = logging_set(&planned)?;
        let diff = reconcile::plan(&old, &new);

        let mut changes = Vec::new();
        for config in &diff.to_remove {
            changes.push(AttributeChange::removed(
                format!("{}.{}", HTTPS_LOGGING_BLOCK, config.name),
                serde_json::to_value(config)?,
            ));
        }
        for config in &diff.to_add {
            changes.push(AttributeChange::added(
                format!("{}.{}", HTTPS_LOGGING_BLOCK, config.name),
                serde_json::to_value(config)?,
            ));
        }

        if changes.is_empty() {
            Ok(PlanResult::no_change(planned))
        } else {
            Ok(PlanResult::with_changes(planned, changes, false))
        }
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value> {
        check_resource_type(resource_type)?;

        let scope = draft_scope(&planned_state)?;
        self.apply(&scope, &ConfigSet::new(), &logging_set(&planned_state)?)
            .await?;
        Ok(planned_state)
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value> {
        check_resource_type(resource_type)?;

        let id = service_id(&current_state)?.to_string();
        let Some(active_version) = version_field(&current_state, "active_version") else {
            // Nothing is serving yet, so there is nothing to read back.
            return Ok(current_state);
        };

        let api = self.api().await?;
        let endpoints = reconcile::refresh(api.as_ref(), &id, active_version).await?;

        let mut state = current_state;
        if let Value::Object(obj) = &mut state {
            obj.insert(
                HTTPS_LOGGING_BLOCK.to_string(),
                Value::Array(endpoints.into_iter().map(Value::Object).collect()),
            );
        }
        Ok(state)
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value> {
        check_resource_type(resource_type)?;

        let scope = draft_scope(&planned_state)?;
        self.apply(&scope, &logging_set(&prior_state)?, &logging_set(&planned_state)?)
            .await?;
        Ok(planned_state)
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<()> {
        check_resource_type(resource_type)?;

        let scope = draft_scope(&current_state)?;
        self.apply(&scope, &logging_set(&current_state)?, &ConfigSet::new())
            .await
    }
}
