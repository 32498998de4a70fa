//! Reconciles the configured set of HTTPS logging endpoints with a service
//! version.
//!
//! Entries are compared as whole records. There is no in-place update: an
//! endpoint whose fields changed is deleted and created again. All deletes
//! run before any create, and nothing is rolled back if a call fails halfway.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, Result};
use crate::https_logging::{
    flatten_https, CreateHttpsInput, DeleteHttpsInput, HttpsLoggingConfig, ListHttpsInput,
    LoggingApi,
};
use crate::types::ServiceVersionRef;

/// Endpoint configs keyed by `name`, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSet {
    entries: BTreeMap<String, HttpsLoggingConfig>,
}

impl ConfigSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, rejecting two entries with the same name.
    pub fn from_configs(configs: impl IntoIterator<Item = HttpsLoggingConfig>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for config in configs {
            let name = config.name.clone();
            if entries.insert(name.clone(), config).is_some() {
                return Err(ProviderError::Validation(format!(
                    "duplicate httpslogging name '{}'",
                    name
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Parse the JSON array stored under `httpslogging`.
    ///
    /// `None` and `null` are the empty set.
    pub fn from_value(value: Option<&Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(Self::new()),
            Some(Value::Array(items)) => {
                let configs = items
                    .iter()
                    .map(HttpsLoggingConfig::from_value)
                    .collect::<Result<Vec<_>>>()?;
                Self::from_configs(configs)
            },
            Some(other) => Err(ProviderError::Validation(format!(
                "httpslogging must be a list, got {}",
                other
            ))),
        }
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&HttpsLoggingConfig> {
        self.entries.get(name)
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no endpoints.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &HttpsLoggingConfig> {
        self.entries.values()
    }

    /// Entries of `self` that have no identical record in `other`.
    pub fn difference<'a>(&'a self, other: &'a ConfigSet) -> Vec<&'a HttpsLoggingConfig> {
        self.entries
            .iter()
            .filter(|(name, config)| other.entries.get(*name) != Some(*config))
            .map(|(_, config)| config)
            .collect()
    }
}

impl FromIterator<HttpsLoggingConfig> for ConfigSet {
    /// Later entries replace earlier ones with the same name.
    fn from_iter<I: IntoIterator<Item = HttpsLoggingConfig>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }
}

/// What a reconciliation will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan<'a> {
    /// Entries in old but not new, deleted first.
    pub to_remove: Vec<&'a HttpsLoggingConfig>,
    /// Entries in new but not old, created after every delete.
    pub to_add: Vec<&'a HttpsLoggingConfig>,
}

impl ReconcilePlan<'_> {
    /// Whether nothing would be deleted or created.
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Diff two sets.
pub fn plan<'a>(old: &'a ConfigSet, new: &'a ConfigSet) -> ReconcilePlan<'a> {
    ReconcilePlan {
        to_remove: old.difference(new),
        to_add: new.difference(old),
    }
}

/// What a reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Endpoints deleted.
    pub deleted: Vec<String>,
    /// Endpoints whose delete returned 404; counted as deleted too.
    pub already_absent: Vec<String>,
    /// Endpoints created.
    pub created: Vec<String>,
}

/// Apply the difference between `old` and `new` to `scope`.
///
/// Stops at the first error other than a 404 on delete. Calls made before
/// the error are not undone.
pub async fn reconcile<A: LoggingApi + ?Sized>(
    api: &A,
    scope: &ServiceVersionRef,
    old: &ConfigSet,
    new: &ConfigSet,
) -> Result<ReconcileReport> {
    let plan = plan(old, new);
    let mut report = ReconcileReport::default();

    // Inputs that can't be sent must not cost the endpoints being replaced.
    let creates = plan
        .to_add
        .iter()
        .map(|config| CreateHttpsInput::from_config(scope, config))
        .collect::<Result<Vec<_>>>()?;

    for config in &plan.to_remove {
        let input = DeleteHttpsInput::from_config(scope, config);
        debug!(%scope, name = %input.name, "removing HTTPS logging endpoint");

        match api.delete_https(&input).await {
            Ok(()) => {},
            Err(err) if err.is_not_found() => {
                warn!(%scope, name = %input.name, "HTTPS logging endpoint already absent");
                report.already_absent.push(input.name.clone());
            },
            Err(err) => return Err(err),
        }
        report.deleted.push(input.name);
    }

    for input in creates {
        debug!(%scope, name = %input.name, "adding HTTPS logging endpoint");

        api.create_https(&input).await?;
        report.created.push(input.name);
    }

    if !report.deleted.is_empty() || !report.created.is_empty() {
        info!(
            %scope,
            deleted = report.deleted.len(),
            created = report.created.len(),
            "reconciled HTTPS logging endpoints"
        );
    }
    Ok(report)
}

/// Read the endpoints of `service_id` at `active_version` in stored-state form.
pub async fn refresh<A: LoggingApi + ?Sized>(
    api: &A,
    service_id: &str,
    active_version: u64,
) -> Result<Vec<Map<String, Value>>> {
    debug!(service_id, active_version, "refreshing HTTPS logging endpoints");

    let scope = ServiceVersionRef::new(service_id, active_version);
    let list = api.list_https(&ListHttpsInput::from(&scope)).await?;
    Ok(flatten_https(&list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ApiCall, RecordingApi};
    use serde_json::json;

    fn endpoint(name: &str) -> HttpsLoggingConfig {
        HttpsLoggingConfig::new(name, format!("https://{}.example.com/logs", name))
    }

    fn set(names: &[&str]) -> ConfigSet {
        ConfigSet::from_configs(names.iter().map(|n| endpoint(n))).unwrap()
    }

    fn scope() -> ServiceVersionRef {
        ServiceVersionRef::new("svc", 5)
    }

    #[test]
    fn test_plan_overlapping_sets() {
        let old = set(&["a", "b"]);
        let new = set(&["b", "c"]);
        let plan = plan(&old, &new);

        let removed: Vec<_> = plan.to_remove.iter().map(|c| c.name.as_str()).collect();
        let added: Vec<_> = plan.to_add.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(removed, vec!["a"]);
        assert_eq!(added, vec!["c"]);
    }

    #[test]
    fn test_plan_identical_sets_is_empty() {
        let old = set(&["a", "b"]);
        assert!(plan(&old, &old.clone()).is_empty());
    }

    #[test]
    fn test_plan_field_change_is_remove_and_add() {
        let old = set(&["a"]);
        let mut changed = endpoint("a");
        changed.url = "https://elsewhere.example.com".into();
        let new = ConfigSet::from_configs([changed.clone()]).unwrap();

        let plan = plan(&old, &new);
        assert_eq!(plan.to_remove, vec![&endpoint("a")]);
        assert_eq!(plan.to_add, vec![&changed]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ConfigSet::from_configs([endpoint("a"), endpoint("a")]).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(msg) if msg.contains("'a'")));
    }

    #[test]
    fn test_from_value() {
        assert!(ConfigSet::from_value(None).unwrap().is_empty());
        assert!(ConfigSet::from_value(Some(&Value::Null)).unwrap().is_empty());

        let value = json!([{"name": "a", "url": "https://a"}]);
        let parsed = ConfigSet::from_value(Some(&value)).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get("a").unwrap().method, "POST");

        assert!(ConfigSet::from_value(Some(&json!({"name": "a"}))).is_err());
    }

    #[tokio::test]
    async fn test_reconcile_deletes_before_creates() {
        let api = RecordingApi::new().with_existing(&scope(), &set(&["a", "b"]));
        let report = reconcile(&api, &scope(), &set(&["a", "b"]), &set(&["b", "c"]))
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![
                ApiCall::Delete {
                    scope: scope(),
                    name: "a".into()
                },
                ApiCall::Create {
                    scope: scope(),
                    name: "c".into()
                },
            ]
        );
        assert_eq!(report.deleted, vec!["a"]);
        assert_eq!(report.created, vec!["c"]);
        assert!(report.already_absent.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_from_empty_only_creates() {
        let api = RecordingApi::new();
        reconcile(&api, &scope(), &ConfigSet::new(), &set(&["a"]))
            .await
            .unwrap();
        assert_eq!(
            api.calls(),
            vec![ApiCall::Create {
                scope: scope(),
                name: "a".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_reconcile_rename_is_delete_then_create() {
        let api = RecordingApi::new().with_existing(&scope(), &set(&["a"]));
        let mut renamed = endpoint("a");
        renamed.name = "z".into();
        let new = ConfigSet::from_configs([renamed]).unwrap();

        reconcile(&api, &scope(), &set(&["a"]), &new).await.unwrap();
        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], ApiCall::Delete { name, .. } if name == "a"));
        assert!(matches!(&calls[1], ApiCall::Create { name, .. } if name == "z"));
    }

    #[tokio::test]
    async fn test_reconcile_tolerates_missing_on_delete() {
        // "a" was removed out of band; the API answers 404.
        let api = RecordingApi::new();
        let report = reconcile(&api, &scope(), &set(&["a"]), &set(&["b"]))
            .await
            .unwrap();

        assert_eq!(report.already_absent, vec!["a"]);
        assert_eq!(report.deleted, vec!["a"]);
        assert_eq!(report.created, vec!["b"]);
    }

    #[tokio::test]
    async fn test_reconcile_aborts_on_delete_error() {
        let api = RecordingApi::new()
            .with_existing(&scope(), &set(&["a", "b"]))
            .fail_delete("a", 500);
        let err = reconcile(&api, &scope(), &set(&["a", "b"]), &set(&["c"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Api { status: 500, .. }));
        // "b" is never attempted, nor is the create.
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_aborts_on_create_error() {
        let api = RecordingApi::new().fail_create("b", 400);
        let err = reconcile(&api, &scope(), &ConfigSet::new(), &set(&["a", "b", "c"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Api { status: 400, .. }));
        let created: Vec<_> = api
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::Create { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(created, vec!["a", "b"]);
        assert!(api.endpoints(&scope()).iter().all(|e| e.name != "c"));
    }

    #[tokio::test]
    async fn test_reconcile_rejects_bad_input_before_deleting() {
        let api = RecordingApi::new().with_existing(&scope(), &set(&["a"]));
        let mut changed = endpoint("a");
        changed.url = "https://a2.example.com/logs".into();
        changed.request_max_bytes = -1;
        let new = ConfigSet::from_configs([changed]).unwrap();

        let err = reconcile(&api, &scope(), &set(&["a"]), &new)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Validation(msg) if msg.contains("request_max_bytes")));
        assert!(api.calls().is_empty());
        assert_eq!(api.endpoints(&scope()).len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_flattens_server_state() {
        let api = RecordingApi::new();
        let scope = scope();
        let mut config = endpoint("a");
        config.content_type = String::new();
        config.header_name = "X-Token".into();
        reconcile(&api, &scope, &ConfigSet::new(), &ConfigSet::from_iter([config]))
            .await
            .unwrap();

        let state = refresh(&api, "svc", 5).await.unwrap();
        assert_eq!(state.len(), 1);
        assert!(!state[0].contains_key("content_type"));
        assert_eq!(state[0]["header_name"], json!("X-Token"));
        assert_eq!(state[0]["name"], json!("a"));
    }
}
