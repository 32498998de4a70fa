//! Fastly provider for Hemmer
//!
//! Two pieces of the Fastly API surface:
//!
//! - **Purge**: invalidate cached content by URL, by surrogate key, or for a
//!   whole service ([`FastlyClient::purge`], [`FastlyClient::purge_key`],
//!   [`FastlyClient::purge_all`]).
//! - **HTTPS logging**: keep the HTTPS logging endpoints of a service version
//!   in line with a declared set ([`reconcile()`]) and read them back into
//!   stored state ([`refresh`]).
//!
//! [`FastlyProvider`] wires the logging reconciler into the
//! [`ProviderService`] lifecycle for the `fastly_service_v1` resource.
//!
//! # Quick Start
//!
//! ```ignore
//! use fastly_provider::{ClientConfig, FastlyClient, PurgeKeyInput};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     fastly_provider::init_logging();
//!
//!     let client = FastlyClient::new(ClientConfig::from_env()?)?;
//!     let purge = client
//!         .purge_key(&PurgeKeyInput {
//!             service: "SU1Z0isxPaozGVKXdv0eY".into(),
//!             key: "product-42".into(),
//!             soft: true,
//!         })
//!         .await?;
//!     println!("purge {} {}", purge.id, purge.status);
//!     Ok(())
//! }
//! ```
//!
//! # Reconciling logging endpoints
//!
//! Endpoints are identified by their full configuration. Changing any field
//! of an endpoint deletes the old one and creates the new one, and all
//! deletes go out before any create so a renamed-in-place endpoint never
//! collides with itself. A 404 on delete counts as already done.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod https_logging;
pub mod logging;
pub mod provider;
pub mod purge;
pub mod reconcile;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::FastlyClient;
pub use config::ClientConfig;
pub use error::{ProviderError, Result};
pub use https_logging::{HttpsLogging, HttpsLoggingConfig, LoggingApi};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::FastlyProvider;
pub use purge::{Purge, PurgeAllInput, PurgeInput, PurgeKeyInput};
pub use reconcile::{reconcile, refresh, ConfigSet, ReconcileReport};
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{AttributeChange, PlanResult, ProviderMetadata, ServiceVersionRef};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
