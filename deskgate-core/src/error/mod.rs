//! Error taxonomy for the gateway.
//!
//! Every failure surfaced by deskgate resolves to one [`GatewayError`]
//! variant. Lower layers keep the original kind when errors cross crate
//! boundaries, so the outermost caller can pick a status code or exit
//! code without re-deriving what went wrong.
//!
//! # Error Hierarchy
//!
//! - `GatewayError` - top-level error type
//!   - `UpstreamError` - transport and HTTP failures from the upstream API
//!   - `ConfigError` - configuration loading and validation
//!
//! Caller-facing output goes through [`GatewayError::to_response`], which
//! produces an [`ErrorResponse`] with a stable `kind` code.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

mod config;
mod upstream;

pub use config::ConfigError;
pub use upstream::{UpstreamError, UpstreamErrorCode};

/// Why caller input was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    /// A required value was not supplied.
    Missing,
    /// A value was supplied but is malformed or out of range.
    Invalid,
    /// A value collides with an existing record.
    Duplicate,
}

impl ValidationReason {
    /// Returns the reason as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Invalid => "invalid",
            Self::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable category of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input or a violated precondition.
    ValidationError,
    /// Invalid master secret or unauthenticated session.
    AuthError,
    /// Tenant, store or upstream resource absent.
    NotFound,
    /// Mutation retries exhausted by concurrent writers.
    ConflictError,
    /// Admission denied by the rate limiter.
    RateLimitExceeded,
    /// Authenticated decryption failed.
    TamperedData,
    /// Upstream transport or HTTP failure.
    UpstreamError,
    /// Local failure unrelated to caller input.
    InternalError,
}

impl ErrorKind {
    /// Returns the kind as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::ConflictError => "CONFLICT_ERROR",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::TamperedData => "TAMPERED_DATA",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for the gateway.
///
/// # Examples
///
/// ```
/// use deskgate_core::error::{ErrorKind, GatewayError};
///
/// let error = GatewayError::not_found("Store", "main-shop");
/// assert_eq!(error.kind(), ErrorKind::NotFound);
/// assert!(error.to_string().contains("main-shop"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayError {
    /// Caller input is malformed or violates a uniqueness rule.
    #[error("Validation failed: {message}")]
    Validation {
        /// Human-readable description.
        message: String,
        /// Field at fault.
        field: Option<String>,
        /// What is wrong with the field.
        reason: ValidationReason,
    },

    /// Authentication failed or the session is unauthenticated.
    #[error("Authentication failed: {reason}")]
    Auth {
        /// Why authentication failed.
        reason: String,
    },

    /// A resource does not exist.
    #[error("{resource_type} not found: {identifier}")]
    NotFound {
        /// Kind of resource, e.g. `Store` or `Order`.
        resource_type: String,
        /// Identifier the caller supplied.
        identifier: String,
    },

    /// Concurrent modification persisted through every mutation attempt.
    #[error("Update conflict persisted after {attempts} attempts; re-fetch and resolve manually")]
    Conflict {
        /// Number of fetch-merge-upload cycles performed.
        attempts: u32,
    },

    /// The rate limiter rejected the call.
    #[error("Rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until enough tokens accrue.
        retry_after_secs: u64,
    },

    /// Stored credential failed authenticated decryption.
    #[error("Stored credential failed integrity check: {reason}")]
    TamperedData {
        /// Diagnostic detail, never containing ciphertext.
        reason: String,
    },

    /// Upstream API failure.
    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    /// Local cryptographic failure other than tampering.
    #[error("Crypto error: {reason}")]
    Crypto {
        /// Reason for the failure.
        reason: String,
    },

    /// Persistence failure.
    #[error("Storage error: {reason}")]
    Storage {
        /// Reason for the failure.
        reason: String,
    },

    /// Configuration failure.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl GatewayError {
    /// Creates a validation error for a malformed field.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
            reason: ValidationReason::Invalid,
        }
    }

    /// Creates a validation error for a field the caller did not supply.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::Validation {
            message: format!("Missing required field: {field}"),
            field: Some(field),
            reason: ValidationReason::Missing,
        }
    }

    /// Creates a validation error for a uniqueness violation.
    #[must_use]
    pub fn duplicate(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
            reason: ValidationReason::Duplicate,
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    /// Creates a conflict error after `attempts` cycles.
    #[must_use]
    pub const fn conflict(attempts: u32) -> Self {
        Self::Conflict { attempts }
    }

    /// Creates a rate-limit error.
    #[must_use]
    pub const fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Creates a tampered data error.
    #[must_use]
    pub fn tampered(reason: impl Into<String>) -> Self {
        Self::TamperedData {
            reason: reason.into(),
        }
    }

    /// Creates a crypto error.
    #[must_use]
    pub fn crypto(reason: impl Into<String>) -> Self {
        Self::Crypto {
            reason: reason.into(),
        }
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    /// Returns the stable category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::Auth { .. } => ErrorKind::AuthError,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::ConflictError,
            Self::RateLimited { .. } => ErrorKind::RateLimitExceeded,
            Self::TamperedData { .. } => ErrorKind::TamperedData,
            Self::Upstream(_) => ErrorKind::UpstreamError,
            Self::Crypto { .. } | Self::Storage { .. } | Self::Config(_) => {
                ErrorKind::InternalError
            }
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns true if this is an authentication error.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Returns true if this is a not-found error, local or upstream.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Upstream(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Returns true if this error signals a concurrent modification upstream.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// Returns true if the upstream transport would retry this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns a suggested retry delay in milliseconds, if applicable.
    #[must_use]
    pub const fn suggested_retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => {
                Some((*retry_after_secs).saturating_mul(1000))
            }
            _ => None,
        }
    }

    /// Returns the inner upstream error, if any.
    #[must_use]
    pub const fn as_upstream(&self) -> Option<&UpstreamError> {
        match self {
            Self::Upstream(e) => Some(e),
            _ => None,
        }
    }

    /// Renders the caller-facing structured result.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        let details = match self {
            Self::Validation { field, reason, .. } => {
                let fields: Vec<&str> = field.iter().map(String::as_str).collect();
                let key = match reason {
                    ValidationReason::Missing => "missing_fields",
                    ValidationReason::Invalid | ValidationReason::Duplicate => "invalid_fields",
                };
                Some(json!({ key: fields, "reason": reason.as_str() }))
            }
            Self::NotFound {
                resource_type,
                identifier,
            } => Some(json!({ "resource_type": resource_type, "identifier": identifier })),
            Self::Conflict { attempts } => Some(json!({ "retries_attempted": attempts })),
            Self::RateLimited { retry_after_secs } => {
                Some(json!({ "retry_after_seconds": retry_after_secs }))
            }
            Self::Upstream(e) => Some(json!({
                "code": e.code.as_str(),
                "status": e.status,
                "resource": e.resource,
            })),
            Self::Auth { .. }
            | Self::TamperedData { .. }
            | Self::Crypto { .. }
            | Self::Storage { .. }
            | Self::Config(_) => None,
        };

        ErrorResponse {
            kind: self.kind(),
            message: self.to_string(),
            details,
        }
    }
}

/// Structured caller-facing rendering of a [`GatewayError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Optional machine-readable details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// A specialized Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
