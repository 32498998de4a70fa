//! In-memory stand-in for the Fastly logging API.
//!
//! [`RecordingApi`] implements [`LoggingApi`] on top of a map of endpoints per
//! service version and records every call, so reconciliation can be tested
//! without a network.
//!
//! # Example
//!
//! ```ignore
//! use fastly_provider::testing::{ApiCall, RecordingApi};
//!
//! let api = RecordingApi::new().fail_delete("old-endpoint", 500);
//! let err = reconcile(&api, &scope, &old, &new).await.unwrap_err();
//! assert_eq!(api.calls().len(), 1);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::https_logging::{
    CreateHttpsInput, DeleteHttpsInput, HttpsLogging, ListHttpsInput, LoggingApi,
};
use crate::reconcile::ConfigSet;
use crate::types::ServiceVersionRef;

/// One call received by [`RecordingApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// `list_https`
    List {
        /// Version that was listed.
        scope: ServiceVersionRef,
    },
    /// `create_https`
    Create {
        /// Version the endpoint was created in.
        scope: ServiceVersionRef,
        /// Endpoint name.
        name: String,
    },
    /// `delete_https`
    Delete {
        /// Version the endpoint was deleted from.
        scope: ServiceVersionRef,
        /// Endpoint name.
        name: String,
    },
}

#[derive(Default)]
struct State {
    calls: Vec<ApiCall>,
    endpoints: HashMap<ServiceVersionRef, BTreeMap<String, HttpsLogging>>,
}

/// A fake [`LoggingApi`] that keeps endpoints in memory.
///
/// Deleting a missing endpoint answers 404 and creating a duplicate answers
/// 409, like the real API.
#[derive(Default)]
pub struct RecordingApi {
    state: Mutex<State>,
    create_failures: HashMap<String, u16>,
    delete_failures: HashMap<String, u16>,
}

impl RecordingApi {
    /// A fake with no endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `scope` with the endpoints of `set`.
    pub fn with_existing(self, scope: &ServiceVersionRef, set: &ConfigSet) -> Self {
        {
            let mut state = self.lock();
            let endpoints = state.endpoints.entry(scope.clone()).or_default();
            for config in set.iter() {
                // Seeding only fails on negative integers, which tests don't use.
                if let Ok(input) = CreateHttpsInput::from_config(scope, config) {
                    endpoints.insert(config.name.clone(), record_from(&input));
                }
            }
        }
        self
    }

    /// Make every create of `name` fail with `status`.
    pub fn fail_create(mut self, name: impl Into<String>, status: u16) -> Self {
        self.create_failures.insert(name.into(), status);
        self
    }

    /// Make every delete of `name` fail with `status`.
    pub fn fail_delete(mut self, name: impl Into<String>, status: u16) -> Self {
        self.delete_failures.insert(name.into(), status);
        self
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Endpoints currently stored for `scope`, in name order.
    pub fn endpoints(&self, scope: &ServiceVersionRef) -> Vec<HttpsLogging> {
        self.lock()
            .endpoints
            .get(scope)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn record_from(input: &CreateHttpsInput) -> HttpsLogging {
    HttpsLogging {
        service_id: input.service.clone(),
        version: input.version,
        name: input.name.clone(),
        url: input.url.clone(),
        request_max_entries: input.request_max_entries,
        request_max_bytes: input.request_max_bytes,
        content_type: input.content_type.clone(),
        header_name: input.header_name.clone(),
        header_value: input.header_value.clone(),
        method: input.method.clone(),
        json_format: input.json_format.clone(),
        tls_ca_cert: input.tls_ca_cert.clone(),
        tls_client_cert: input.tls_client_cert.clone(),
        tls_client_key: input.tls_client_key.clone(),
        tls_hostname: input.tls_hostname.clone(),
        format: input.format.clone(),
        format_version: u64::from(input.format_version),
        message_type: input.message_type.clone(),
        placement: input.placement.clone(),
        response_condition: input.response_condition.clone(),
    }
}

fn api_error(status: u16, name: &str) -> ProviderError {
    ProviderError::Api {
        status,
        body: format!("{{\"msg\":\"injected failure\",\"detail\":\"{}\"}}", name),
    }
}

#[async_trait]
impl LoggingApi for RecordingApi {
    async fn list_https(&self, input: &ListHttpsInput) -> Result<Vec<HttpsLogging>> {
        let scope = ServiceVersionRef::new(input.service.clone(), input.version);
        self.lock().calls.push(ApiCall::List {
            scope: scope.clone(),
        });
        Ok(self.endpoints(&scope))
    }

    async fn create_https(&self, input: &CreateHttpsInput) -> Result<HttpsLogging> {
        let scope = ServiceVersionRef::new(input.service.clone(), input.version);
        let mut state = self.lock();
        state.calls.push(ApiCall::Create {
            scope: scope.clone(),
            name: input.name.clone(),
        });

        if let Some(status) = self.create_failures.get(&input.name) {
            return Err(api_error(*status, &input.name));
        }
        let endpoints = state.endpoints.entry(scope).or_default();
        if endpoints.contains_key(&input.name) {
            return Err(api_error(409, &input.name));
        }
        let record = record_from(input);
        endpoints.insert(input.name.clone(), record.clone());
        Ok(record)
    }

    async fn delete_https(&self, input: &DeleteHttpsInput) -> Result<()> {
        let scope = ServiceVersionRef::new(input.service.clone(), input.version);
        let mut state = self.lock();
        state.calls.push(ApiCall::Delete {
            scope: scope.clone(),
            name: input.name.clone(),
        });

        if let Some(status) = self.delete_failures.get(&input.name) {
            return Err(api_error(*status, &input.name));
        }
        let removed = state
            .endpoints
            .get_mut(&scope)
            .and_then(|m| m.remove(&input.name));
        match removed {
            Some(_) => Ok(()),
            None => Err(api_error(404, &input.name)),
        }
    }
}
