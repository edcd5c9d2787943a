//! # Deskgate Gateway
//!
//! Upstream access for the deskgate credential gateway.
//!
//! This crate provides:
//! - REST client for the `OrderDesk` API with retry, backoff and jitter
//! - Order and inventory item operations with pagination
//! - Conflict-safe fetch-merge-upload updates for full-replacement resources
//! - The [`service::GatewayService`] facade used by the CLI
//!
//! # Architecture
//!
//! - `upstream` - HTTP transport and resource helpers
//! - `mutation` - merge rules, path operations and the retrying coordinator
//! - `cache` - short-lived read cache scoped by tenant, store and resource kind
//! - `service` - admission, store resolution and credential decryption per call
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deskgate_core::config::GatewayConfig;
//! use deskgate_core::types::ResourceKind;
//! use deskgate_gateway::service::GatewayService;
//! use deskgate_security::credentials::{MemoryRepository, StoreRegistration};
//! use deskgate_security::secret::Secret;
//! use serde_json::json;
//!
//! # async fn example(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = GatewayService::new(&config, Arc::new(MemoryRepository::new()))?;
//! let mut session = gateway.login(&Secret::from("my-long-master-secret"), None).await?;
//!
//! gateway
//!     .register_store(&session, StoreRegistration::new("12345", "od-api-key").with_name("Main"))
//!     .await?;
//! gateway.use_store(&mut session, "main").await?;
//!
//! let changes = json!({"email": "new@example.com", "order_notes": null});
//! gateway
//!     .update_resource(&session, None, ResourceKind::Order, "1001", changes.as_object().cloned().unwrap_or_default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

/// Upstream REST client
pub mod upstream;

/// Fetch-merge-upload workflow
pub mod mutation;

/// Upstream read cache
pub mod cache;

/// Gateway facade
pub mod service;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::mutation::{
        AddressKind, Mutation, MutationCoordinator, MutationOutcome, MutationState, PathOp,
        PathOperation, merge_changes,
    };
    pub use crate::service::{ConnectionStatus, GatewayService};
    pub use crate::upstream::{ResourceApi, UpstreamClient, UpstreamConfig};
}
