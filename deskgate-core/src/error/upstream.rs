//! Upstream API failure classification.
//!
//! Every HTTP status and transport failure observed while talking to the
//! upstream API is mapped to an [`UpstreamErrorCode`] here, and the retry
//! and conflict decisions are answered from that mapping only. Call sites
//! never inspect raw status codes themselves.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable code for an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpstreamErrorCode {
    /// 400: the upstream rejected the request shape.
    BadRequest,
    /// 401: credential rejected.
    Unauthorized,
    /// 403: credential lacks access.
    Forbidden,
    /// 404: resource absent upstream.
    NotFound,
    /// 409: concurrent modification reported by the upstream.
    Conflict,
    /// 429: upstream throttled the caller.
    RateLimited,
    /// 500 and unlisted 5xx statuses.
    InternalError,
    /// 502.
    BadGateway,
    /// 503.
    ServiceUnavailable,
    /// 504.
    GatewayTimeout,
    /// The request exceeded its timeout.
    Timeout,
    /// Connection could not be established or was dropped.
    NetworkError,
    /// The response body could not be decoded.
    InvalidResponse,
    /// The stored credential cannot be encoded as request headers.
    InvalidCredential,
    /// Any other non-success status.
    ApiError,
}

impl UpstreamErrorCode {
    /// Maps an HTTP status to its code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            429 => Self::RateLimited,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            500..=599 => Self::InternalError,
            _ => Self::ApiError,
        }
    }

    /// Returns true for transient failures worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::InternalError
                | Self::BadGateway
                | Self::ServiceUnavailable
                | Self::GatewayTimeout
                | Self::Timeout
                | Self::NetworkError
        )
    }

    /// Returns the wire representation of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::BadGateway => "BAD_GATEWAY",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::GatewayTimeout => "GATEWAY_TIMEOUT",
            Self::Timeout => "TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::ApiError => "API_ERROR",
        }
    }
}

impl fmt::Display for UpstreamErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure returned by, or while reaching, the upstream API.
///
/// # Examples
///
/// ```
/// use deskgate_core::error::{UpstreamError, UpstreamErrorCode};
///
/// let error = UpstreamError::from_status(503, "maintenance");
/// assert_eq!(error.code, UpstreamErrorCode::ServiceUnavailable);
/// assert!(error.is_retryable());
/// assert!(!error.is_conflict());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("[Upstream] {code}: {message}")]
pub struct UpstreamError {
    /// Classified failure code.
    pub code: UpstreamErrorCode,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Human-readable message, already scrubbed of credential material.
    pub message: String,
    /// Resource the call targeted, e.g. `orders/1234`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl UpstreamError {
    /// Creates an error with an explicit code.
    #[must_use]
    pub fn new(code: UpstreamErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: None,
            message: message.into(),
            resource: None,
        }
    }

    /// Classifies a non-success HTTP response.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            message
        };
        Self {
            code: UpstreamErrorCode::from_status(status),
            status: Some(status),
            message,
            resource: None,
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(
            UpstreamErrorCode::Timeout,
            format!("Request timed out after {timeout_ms}ms"),
        )
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(reason: impl Into<String>) -> Self {
        Self::new(UpstreamErrorCode::NetworkError, reason)
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::new(UpstreamErrorCode::InvalidResponse, reason)
    }

    /// Creates an error for a credential that cannot be sent upstream.
    ///
    /// Never retryable: the request is rejected before it leaves the process.
    #[must_use]
    pub fn invalid_credential(reason: impl Into<String>) -> Self {
        Self::new(UpstreamErrorCode::InvalidCredential, reason)
    }

    /// Attaches the targeted resource for context.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Returns true if the transport should retry this failure.
    ///
    /// Rate limiting, any 5xx, timeouts and network failures are retried.
    /// Other 4xx responses are never retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable() || self.status.is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns true if this failure signals a concurrent modification.
    ///
    /// The upstream has no versioning token, so a 409 or a message that
    /// mentions a conflict are both treated as conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.code == UpstreamErrorCode::Conflict
            || self.status == Some(409)
            || self.message.to_ascii_lowercase().contains("conflict")
    }

    /// Returns true if the upstream reported the resource as absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code == UpstreamErrorCode::NotFound
    }
}
