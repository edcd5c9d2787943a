//! Tenant-scoped registry of upstream stores and their encrypted API keys.

use super::models::{StoreRecord, StoreSummary};
use super::repository::CredentialRepository;
use crate::crypto::CryptoEngine;
use crate::secret::Secret;
use crate::session::SessionContext;
use chrono::Utc;
use deskgate_core::error::{GatewayError, Result};
use deskgate_core::types::StoreRecordId;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument};

const MAX_NAME_LEN: usize = 100;

/// Input for [`CredentialStore::register_store`].
#[derive(Debug, Clone)]
pub struct StoreRegistration {
    /// Upstream store identifier.
    pub store_id: String,
    /// Upstream API key in plaintext.
    pub api_key: Secret,
    /// Friendly name; defaults to the store ID.
    pub name: Option<String>,
    /// Free-form label.
    pub label: Option<String>,
}

impl StoreRegistration {
    /// Creates a registration with no name or label.
    #[must_use]
    pub fn new(store_id: impl Into<String>, api_key: impl Into<Secret>) -> Self {
        Self {
            store_id: store_id.into(),
            api_key: api_key.into(),
            name: None,
            label: None,
        }
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A decrypted upstream credential, held only for one call.
pub struct StoreCredential {
    /// Upstream store identifier.
    pub store_id: String,
    /// Upstream API key.
    pub api_key: Secret,
}

impl fmt::Debug for StoreCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredential")
            .field("store_id", &self.store_id)
            .field("api_key", &self.api_key)
            .finish()
    }
}

/// Store registry bound to a repository and crypto engine.
///
/// Every operation is scoped to the session's tenant; records of other
/// tenants are indistinguishable from records that do not exist.
#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn CredentialRepository>,
    crypto: Arc<CryptoEngine>,
}

impl CredentialStore {
    /// Creates a new credential store.
    #[must_use]
    pub fn new(repo: Arc<dyn CredentialRepository>, crypto: Arc<CryptoEngine>) -> Self {
        Self { repo, crypto }
    }

    /// Encrypts and stores a new upstream store for the session's tenant.
    #[instrument(skip_all, parent = session.span(), fields(store_id = %registration.store_id))]
    pub async fn register_store(
        &self,
        session: &SessionContext,
        registration: StoreRegistration,
    ) -> Result<StoreSummary> {
        let store_id = registration.store_id.trim().to_string();
        if store_id.is_empty() {
            return Err(GatewayError::missing("store_id"));
        }
        if store_id.chars().any(char::is_control) {
            return Err(GatewayError::invalid("store_id", "Store ID must not contain control characters"));
        }
        if registration.api_key.is_blank() {
            return Err(GatewayError::missing("api_key"));
        }
        if registration.api_key.expose().iter().any(u8::is_ascii_control) {
            return Err(GatewayError::invalid("api_key", "API key must not contain control characters"));
        }
        let name = match registration.name.as_deref().map(str::trim) {
            None => store_id.clone(),
            Some("") => return Err(GatewayError::invalid("name", "Store name must not be empty")),
            Some(name) if name.chars().count() > MAX_NAME_LEN => {
                return Err(GatewayError::invalid(
                    "name",
                    format!("Store name must be at most {MAX_NAME_LEN} characters"),
                ));
            }
            Some(name) => name.to_string(),
        };

        let encrypted = self
            .crypto
            .encrypt_credential(registration.api_key.expose(), session.tenant_key())?;

        let now = Utc::now();
        let record = StoreRecord {
            id: StoreRecordId::generate(),
            tenant_id: session.tenant_id(),
            store_id,
            name,
            label: registration.label.filter(|label| !label.trim().is_empty()),
            api_key_ciphertext: encrypted.ciphertext,
            api_key_tag: encrypted.tag.to_vec(),
            api_key_nonce: encrypted.nonce.to_vec(),
            created_at: now,
            updated_at: now,
        };
        let summary = record.summary();
        self.repo.insert_store(record).await?;

        info!(store_name = %summary.name, "Store registered");
        Ok(summary)
    }

    /// Resolves an identifier to one of the tenant's stores.
    ///
    /// Tries the upstream store ID first, then the friendly name ignoring case.
    pub async fn resolve_store(&self, session: &SessionContext, identifier: &str) -> Result<StoreRecord> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(GatewayError::missing("store_identifier"));
        }
        let tenant_id = session.tenant_id();
        if let Some(store) = self.repo.find_store_by_id(tenant_id, identifier).await? {
            return Ok(store);
        }
        self.repo
            .find_store_by_name(tenant_id, identifier)
            .await?
            .ok_or_else(|| GatewayError::not_found("Store", identifier))
    }

    /// Decrypts a store's API key with the session's tenant key.
    ///
    /// The plaintext lives only as long as the returned value.
    pub fn get_decrypted_credential(&self, session: &SessionContext, store: &StoreRecord) -> Result<StoreCredential> {
        if store.tenant_id != session.tenant_id() {
            return Err(GatewayError::not_found("Store", store.store_id.clone()));
        }

        let api_key = self
            .crypto
            .decrypt_credential(
                &store.api_key_ciphertext,
                &store.api_key_tag,
                &store.api_key_nonce,
                session.tenant_key(),
            )
            .inspect_err(|e| {
                if matches!(e, GatewayError::TamperedData { .. }) {
                    error!(
                        parent: session.span(),
                        tenant_id = %store.tenant_id,
                        store_id = %store.store_id,
                        record_id = %store.id,
                        "Stored credential failed integrity check"
                    );
                }
            })?;

        Ok(StoreCredential {
            store_id: store.store_id.clone(),
            api_key,
        })
    }

    /// Resolves a store and decrypts its API key.
    pub async fn resolve_credential(
        &self,
        session: &SessionContext,
        identifier: &str,
    ) -> Result<StoreCredential> {
        let store = self.resolve_store(session, identifier).await?;
        self.get_decrypted_credential(session, &store)
    }

    /// Lists the tenant's stores, newest first.
    pub async fn list_stores(&self, session: &SessionContext) -> Result<Vec<StoreSummary>> {
        Ok(self
            .repo
            .list_stores(session.tenant_id())
            .await?
            .iter()
            .map(StoreRecord::summary)
            .collect())
    }

    /// Deletes a store by upstream ID or friendly name.
    ///
    /// Clears the session's active store if it pointed at the deleted store.
    /// Returns false if nothing matched.
    #[instrument(skip_all, parent = session.span(), fields(identifier = %identifier))]
    pub async fn delete_store(&self, session: &mut SessionContext, identifier: &str) -> Result<bool> {
        let store = match self.resolve_store(session, identifier).await {
            Ok(store) => store,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };

        let deleted = self.repo.delete_store(session.tenant_id(), &store.store_id).await?;
        if deleted {
            if session.active_store() == Some(store.store_id.as_str()) {
                session.clear_active_store();
            }
            info!(store_id = %store.store_id, "Store deleted");
        }
        Ok(deleted)
    }

    /// Resolves a store and makes it the session's active store.
    pub async fn use_store(&self, session: &mut SessionContext, identifier: &str) -> Result<StoreSummary> {
        let store = self.resolve_store(session, identifier).await?;
        session.set_active_store(store.store_id.clone());
        Ok(store.summary())
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("crypto", &self.crypto)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryRepository;
    use crate::crypto::{Argon2Params, TenantKey, KEY_SIZE};
    use deskgate_core::error::ValidationReason;
    use deskgate_core::types::TenantId;

    fn fixture() -> (CredentialStore, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let crypto = Arc::new(
            CryptoEngine::new(
                &[5u8; 32],
                Argon2Params {
                    memory_cost: 1024,
                    time_cost: 1,
                    parallelism: 1,
                },
            )
            .unwrap(),
        );
        (CredentialStore::new(repo.clone(), crypto), repo)
    }

    fn session(byte: u8) -> SessionContext {
        SessionContext::new(TenantId::generate(), TenantKey::from_bytes([byte; KEY_SIZE]))
    }

    #[tokio::test]
    async fn test_register_and_decrypt() {
        let (store, _) = fixture();
        let session = session(1);

        let summary = store
            .register_store(&session, StoreRegistration::new("12345", "api-key-1").with_name("Main"))
            .await
            .unwrap();
        assert_eq!(summary.name, "Main");

        let credential = store.resolve_credential(&session, "main").await.unwrap();
        assert_eq!(credential.store_id, "12345");
        assert_eq!(credential.api_key.expose_str(), Some("api-key-1"));
        assert!(!format!("{credential:?}").contains("api-key-1"));
    }

    #[tokio::test]
    async fn test_name_defaults_to_store_id() {
        let (store, _) = fixture();
        let session = session(1);
        let summary = store
            .register_store(&session, StoreRegistration::new("S1", "key"))
            .await
            .unwrap();
        assert_eq!(summary.name, "S1");
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (store, _) = fixture();
        let session = session(1);

        let err = store
            .register_store(&session, StoreRegistration::new(" ", "key"))
            .await
            .unwrap_err();
        assert!(err.is_validation_error());

        let err = store
            .register_store(&session, StoreRegistration::new("S1", ""))
            .await
            .unwrap_err();
        assert!(err.is_validation_error());

        let err = store
            .register_store(&session, StoreRegistration::new("S1", "key").with_name("  "))
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_register_rejects_control_characters() {
        let (store, repo) = fixture();
        let session = session(1);

        let err = store
            .register_store(&session, StoreRegistration::new("S1", "bad\nkey"))
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
        assert!(!err.to_string().contains("bad"));

        let err = store
            .register_store(&session, StoreRegistration::new("S\t1", "od-key"))
            .await
            .unwrap_err();
        assert!(err.is_validation_error());

        assert!(repo.list_stores(session.tenant_id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let (store, _) = fixture();
        let session = session(1);
        store
            .register_store(&session, StoreRegistration::new("S1", "key"))
            .await
            .unwrap();

        let err = store
            .register_store(&session, StoreRegistration::new("S1", "key").with_name("Other"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Validation {
                reason: ValidationReason::Duplicate,
                ref field,
                ..
            } if field.as_deref() == Some("store_id")
        ));
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let (store, _) = fixture();
        let alice = session(1);
        let bob = session(2);

        store
            .register_store(&alice, StoreRegistration::new("S1", "alice-key").with_name("Shop"))
            .await
            .unwrap();

        assert!(store.resolve_store(&bob, "S1").await.unwrap_err().is_not_found());
        assert!(store.resolve_store(&bob, "shop").await.unwrap_err().is_not_found());
        assert!(store.list_stores(&bob).await.unwrap().is_empty());

        let record = store.resolve_store(&alice, "S1").await.unwrap();
        assert!(store.get_decrypted_credential(&bob, &record).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_detected() {
        let (store, repo) = fixture();
        let session = session(1);
        store
            .register_store(&session, StoreRegistration::new("S1", "key"))
            .await
            .unwrap();

        let mut record = store.resolve_store(&session, "S1").await.unwrap();
        record.api_key_ciphertext[0] ^= 0xFF;
        repo.delete_store(session.tenant_id(), "S1").await.unwrap();
        repo.insert_store(record).await.unwrap();

        let err = store.resolve_credential(&session, "S1").await.unwrap_err();
        assert!(matches!(err, GatewayError::TamperedData { .. }));
    }

    #[tokio::test]
    async fn test_id_resolution_precedes_name() {
        let (store, _) = fixture();
        let session = session(1);
        store
            .register_store(&session, StoreRegistration::new("A", "key-a").with_name("B"))
            .await
            .unwrap();
        store
            .register_store(&session, StoreRegistration::new("B", "key-b").with_name("Other"))
            .await
            .unwrap();

        let resolved = store.resolve_store(&session, "B").await.unwrap();
        assert_eq!(resolved.store_id, "B");
    }

    #[tokio::test]
    async fn test_use_and_delete_store() {
        let (store, _) = fixture();
        let mut session = session(1);
        store
            .register_store(&session, StoreRegistration::new("S1", "key").with_name("Main"))
            .await
            .unwrap();
        store
            .register_store(&session, StoreRegistration::new("S2", "key"))
            .await
            .unwrap();

        let names: Vec<_> = store
            .list_stores(&session)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.store_id)
            .collect();
        assert_eq!(names, vec!["S2", "S1"]);

        store.use_store(&mut session, "MAIN").await.unwrap();
        assert_eq!(session.active_store(), Some("S1"));

        assert!(store.delete_store(&mut session, "main").await.unwrap());
        assert_eq!(session.active_store(), None);
        assert!(!store.delete_store(&mut session, "main").await.unwrap());
    }
}
