//! Span definitions for request tracing.

use tracing::{Span, info_span};

/// Creates the span covering one authenticated session.
///
/// # Example
///
/// ```
/// use deskgate_telemetry::spans::session_span;
///
/// let span = session_span("7f0c1d9e", "a1b2");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn session_span(correlation_id: &str, tenant_id: &str) -> Span {
    info_span!(
        "session",
        correlation_id = %correlation_id,
        tenant_id = %tenant_id
    )
}

/// Creates a span for one logical upstream call, across all retry attempts.
#[must_use]
pub fn upstream_span(method: &str, path: &str, store_id: &str) -> Span {
    info_span!(
        "upstream",
        method = %method,
        path = %path,
        store_id = %store_id,
        otel.kind = "client"
    )
}

/// Creates a span for a fetch-merge-upload workflow.
#[must_use]
pub fn mutation_span(resource: &str, resource_id: &str, max_attempts: u32) -> Span {
    info_span!(
        "mutation",
        resource = %resource,
        resource_id = %resource_id,
        max_attempts = max_attempts
    )
}
