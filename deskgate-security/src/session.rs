//! Per-connection authenticated session state.

use crate::crypto::TenantKey;
use deskgate_core::error::{GatewayError, Result};
use deskgate_core::types::TenantId;
use deskgate_telemetry::spans::session_span;
use tracing::Span;
use uuid::Uuid;

/// Generates a correlation ID for a new session or request.
#[must_use]
pub fn new_correlation_id() -> Uuid {
    Uuid::new_v4()
}

/// Authenticated context passed explicitly to every tenant-scoped operation.
///
/// Owns the tenant key for the lifetime of the connection; the key is zeroed
/// when the session is dropped. Sessions are neither cloned nor shared.
#[derive(Debug)]
pub struct SessionContext {
    tenant_id: TenantId,
    key: TenantKey,
    active_store: Option<String>,
    correlation_id: Uuid,
    span: Span,
}

impl SessionContext {
    /// Creates a session for an authenticated tenant.
    #[must_use]
    pub fn new(tenant_id: TenantId, key: TenantKey) -> Self {
        Self::with_correlation_id(tenant_id, key, new_correlation_id())
    }

    /// Creates a session with a caller-supplied correlation ID.
    #[must_use]
    pub fn with_correlation_id(tenant_id: TenantId, key: TenantKey, correlation_id: Uuid) -> Self {
        let span = session_span(&correlation_id.to_string(), &tenant_id.to_string());
        Self {
            tenant_id,
            key,
            active_store: None,
            correlation_id,
            span,
        }
    }

    /// Returns the authenticated tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the tenant key.
    #[must_use]
    pub const fn tenant_key(&self) -> &TenantKey {
        &self.key
    }

    /// Returns the correlation ID attached to this session's logs.
    #[must_use]
    pub const fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Returns the tracing span for this session.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Returns the upstream ID of the active store, if any.
    #[must_use]
    pub fn active_store(&self) -> Option<&str> {
        self.active_store.as_deref()
    }

    /// Sets the store used when an operation names none.
    pub fn set_active_store(&mut self, store_id: impl Into<String>) {
        self.active_store = Some(store_id.into());
    }

    /// Clears the active store.
    pub fn clear_active_store(&mut self) {
        self.active_store = None;
    }

    /// Picks the store an operation targets: the explicit identifier if
    /// given, otherwise the active store.
    pub fn require_store_identifier(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(self.active_store.as_deref())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::missing("store_identifier"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_SIZE;

    fn session() -> SessionContext {
        SessionContext::new(TenantId::generate(), TenantKey::from_bytes([1; KEY_SIZE]))
    }

    #[test]
    fn test_store_identifier_resolution() {
        let mut session = session();
        assert!(session.require_store_identifier(None).unwrap_err().is_validation_error());

        session.set_active_store("S1");
        assert_eq!(session.require_store_identifier(None).unwrap(), "S1");
        assert_eq!(session.require_store_identifier(Some("S2")).unwrap(), "S2");
        assert_eq!(session.require_store_identifier(Some("  ")).unwrap(), "S1");

        session.clear_active_store();
        assert_eq!(session.active_store(), None);
    }

    #[test]
    fn test_debug_hides_key() {
        let session = session();
        let debug = format!("{session:?}");
        assert!(debug.contains("TenantKey([REDACTED])"));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        assert_ne!(session().correlation_id(), session().correlation_id());
    }
}
