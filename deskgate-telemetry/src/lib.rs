//! # Deskgate Telemetry
//!
//! Logging and tracing for the deskgate credential gateway.
//!
//! This crate provides:
//! - Structured logging with JSON and pretty formats
//! - Rolling file output via `tracing-appender`
//! - Masking of API keys, master secrets and KMS keys in every log line
//! - Span helpers carrying correlation, tenant and store identifiers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

/// Logging configuration and initialization
pub mod logging;

/// Sensitive data masking
pub mod masking;

/// Span definitions for request tracing
pub mod spans;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::logging::{LogConfig, LogFormat, LogOutput, init_logging};
    pub use crate::masking::{Sensitive, SensitiveDataMasker};
    pub use crate::spans::*;
}
