//! Storage interface for tenant and store records.

use super::models::{StoreRecord, TenantRecord};
use async_trait::async_trait;
use deskgate_core::error::Result;
use deskgate_core::types::TenantId;

/// Trait for credential storage backends.
///
/// Implementations must enforce store uniqueness atomically inside
/// [`insert_store`](Self::insert_store): concurrent registrations of the same
/// upstream store ID or friendly name for one tenant yield exactly one success.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Stores a new tenant.
    async fn insert_tenant(&self, tenant: TenantRecord) -> Result<()>;

    /// Replaces an existing tenant record.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the tenant does not exist.
    async fn update_tenant(&self, tenant: TenantRecord) -> Result<()>;

    /// Retrieves a tenant by ID.
    async fn get_tenant(&self, id: TenantId) -> Result<Option<TenantRecord>>;

    /// Lists all tenants.
    async fn list_tenants(&self) -> Result<Vec<TenantRecord>>;

    /// Deletes a tenant together with all of its stores.
    async fn delete_tenant(&self, id: TenantId) -> Result<bool>;

    /// Stores a new store record.
    ///
    /// # Errors
    ///
    /// Returns a duplicate validation error on field `store_id` if the tenant
    /// already has the upstream store ID, otherwise on field `name` if the
    /// friendly name is taken (case-insensitive).
    async fn insert_store(&self, store: StoreRecord) -> Result<()>;

    /// Lists a tenant's stores, newest first.
    async fn list_stores(&self, tenant_id: TenantId) -> Result<Vec<StoreRecord>>;

    /// Deletes a tenant's store by upstream store ID.
    async fn delete_store(&self, tenant_id: TenantId, store_id: &str) -> Result<bool>;

    /// Finds a tenant's store by upstream store ID.
    async fn find_store_by_id(&self, tenant_id: TenantId, store_id: &str) -> Result<Option<StoreRecord>> {
        Ok(self
            .list_stores(tenant_id)
            .await?
            .into_iter()
            .find(|store| store.store_id == store_id))
    }

    /// Finds a tenant's store by friendly name, ignoring case.
    async fn find_store_by_name(&self, tenant_id: TenantId, name: &str) -> Result<Option<StoreRecord>> {
        Ok(self
            .list_stores(tenant_id)
            .await?
            .into_iter()
            .find(|store| store.name.eq_ignore_ascii_case(name)))
    }
}
