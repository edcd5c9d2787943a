//! Tenant authentication and lifecycle.

use crate::credentials::{CredentialRepository, TenantRecord};
use crate::crypto::CryptoEngine;
use crate::secret::Secret;
use crate::session::SessionContext;
use chrono::Utc;
use deskgate_core::error::{GatewayError, Result};
use deskgate_core::types::TenantId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Minimum master secret length in bytes.
pub const MIN_MASTER_SECRET_LEN: usize = 16;

/// Authenticates tenants by master secret and manages their lifecycle.
///
/// Authentication verifies the secret against every stored hash, so its
/// cost grows with the number of tenants. Tenant creation is serialized so
/// that one master secret never yields two tenants within a process.
#[derive(Clone)]
pub struct TenantService {
    repo: Arc<dyn CredentialRepository>,
    crypto: Arc<CryptoEngine>,
    auto_provision: bool,
    provision_lock: Arc<Mutex<()>>,
}

impl TenantService {
    /// Creates a new tenant service.
    #[must_use]
    pub fn new(repo: Arc<dyn CredentialRepository>, crypto: Arc<CryptoEngine>, auto_provision: bool) -> Self {
        Self {
            repo,
            crypto,
            auto_provision,
            provision_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns true if unknown master secrets create new tenants.
    #[must_use]
    pub const fn auto_provision(&self) -> bool {
        self.auto_provision
    }

    /// Finds the tenant whose stored hash matches the master secret.
    pub async fn authenticate(&self, master_secret: &Secret) -> Result<TenantRecord> {
        if master_secret.is_blank() {
            return Err(GatewayError::missing("master_secret"));
        }
        match self.find_tenant(master_secret).await? {
            Some(tenant) => {
                info!(tenant_id = %tenant.id, "Tenant authenticated");
                Ok(tenant)
            }
            None => {
                warn!(reason = "invalid_master_secret", "Authentication failed");
                Err(GatewayError::auth("Invalid master secret"))
            }
        }
    }

    /// Creates a tenant for a new master secret.
    ///
    /// # Errors
    ///
    /// Fails with an auth error if the secret already belongs to a tenant.
    pub async fn create_tenant(&self, master_secret: &Secret, email: Option<String>) -> Result<TenantRecord> {
        check_new_secret(master_secret)?;

        let _guard = self.provision_lock.lock().await;
        if self.find_tenant(master_secret).await?.is_some() {
            return Err(GatewayError::auth("Tenant already exists for this master secret"));
        }
        self.insert_new_tenant(master_secret, email).await
    }

    /// Authenticates, creating the tenant if unknown and auto-provisioning is on.
    ///
    /// Returns the tenant and whether it was just created.
    pub async fn authenticate_or_provision(&self, master_secret: &Secret) -> Result<(TenantRecord, bool)> {
        match self.authenticate(master_secret).await {
            Ok(tenant) => Ok((tenant, false)),
            Err(GatewayError::Auth { .. }) if self.auto_provision => {
                check_new_secret(master_secret)?;
                let _guard = self.provision_lock.lock().await;
                // Another caller may have provisioned this secret while we waited.
                if let Some(tenant) = self.find_tenant(master_secret).await? {
                    return Ok((tenant, false));
                }
                info!("Auto-provisioning new tenant");
                let tenant = self.insert_new_tenant(master_secret, None).await?;
                Ok((tenant, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Authenticates a master secret and opens a session with the derived key.
    pub async fn open_session(&self, master_secret: &Secret) -> Result<SessionContext> {
        let (tenant, _) = self.authenticate_or_provision(master_secret).await?;
        let key = self.crypto.derive_tenant_key(master_secret, &tenant.salt)?;
        let tenant_id = tenant.id;
        self.record_login(tenant).await?;

        let session = SessionContext::new(tenant_id, key);
        info!(parent: session.span(), "Session opened");
        Ok(session)
    }

    /// Stamps `last_login_at` and persists the tenant.
    pub async fn record_login(&self, mut tenant: TenantRecord) -> Result<TenantRecord> {
        let now = Utc::now();
        tenant.last_login_at = Some(now);
        tenant.updated_at = now;
        self.repo.update_tenant(tenant.clone()).await?;
        Ok(tenant)
    }

    /// Retrieves a tenant by ID.
    pub async fn get_tenant(&self, id: TenantId) -> Result<TenantRecord> {
        self.repo
            .get_tenant(id)
            .await?
            .ok_or_else(|| GatewayError::not_found("Tenant", id.to_string()))
    }

    /// Deletes the session's tenant and all of its stores, ending the session.
    pub async fn delete_tenant(&self, session: SessionContext) -> Result<bool> {
        let tenant_id = session.tenant_id();
        let deleted = self.repo.delete_tenant(tenant_id).await?;
        if deleted {
            info!(parent: session.span(), "Tenant deleted");
        }
        Ok(deleted)
    }

    async fn insert_new_tenant(&self, master_secret: &Secret, email: Option<String>) -> Result<TenantRecord> {
        let hashed = self.crypto.hash_secret(master_secret)?;
        let tenant = TenantRecord::new(hashed.hash, hashed.salt.to_vec(), email);
        self.repo.insert_tenant(tenant.clone()).await?;

        info!(tenant_id = %tenant.id, "Tenant created");
        Ok(tenant)
    }

    async fn find_tenant(&self, master_secret: &Secret) -> Result<Option<TenantRecord>> {
        Ok(self
            .repo
            .list_tenants()
            .await?
            .into_iter()
            .find(|tenant| self.crypto.verify_secret(master_secret, &tenant.secret_hash)))
    }
}

fn check_new_secret(master_secret: &Secret) -> Result<()> {
    if master_secret.len() < MIN_MASTER_SECRET_LEN || master_secret.is_blank() {
        return Err(GatewayError::invalid(
            "master_secret",
            format!("Master secret must be at least {MIN_MASTER_SECRET_LEN} bytes"),
        ));
    }
    Ok(())
}
