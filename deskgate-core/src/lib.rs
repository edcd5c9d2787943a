//! # Deskgate Core
//!
//! Shared building blocks for the deskgate credential gateway.
//!
//! This crate provides:
//! - The error taxonomy every other crate reports through ([`error::GatewayError`])
//! - Centralized classification of upstream failures ([`error::UpstreamError`])
//! - Typed identifiers for tenants, stores and upstream resources
//! - Configuration loading from YAML/TOML/JSON with `DESKGATE_*` environment overrides

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

/// Error types and structured error responses
pub mod error;

/// Identifier and resource types
pub mod types;

/// Configuration management
pub mod config;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::types::*;
}
