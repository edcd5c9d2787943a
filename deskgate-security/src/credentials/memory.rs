//! In-memory credential repository.

use super::models::{StoreRecord, TenantRecord};
use super::repository::CredentialRepository;
use async_trait::async_trait;
use dashmap::DashMap;
use deskgate_core::error::{GatewayError, Result};
use deskgate_core::types::TenantId;

/// In-memory repository for tests and embedding.
///
/// Stores are kept per tenant in registration order. Nothing is persisted;
/// use [`SqliteRepository`](super::SqliteRepository) for durable state.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tenants: DashMap<TenantId, TenantRecord>,
    stores: DashMap<TenantId, Vec<StoreRecord>>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tenants.
    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    /// Returns the number of stores across all tenants.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.stores.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl CredentialRepository for MemoryRepository {
    async fn insert_tenant(&self, tenant: TenantRecord) -> Result<()> {
        if self.tenants.contains_key(&tenant.id) {
            return Err(GatewayError::duplicate("tenant_id", "Tenant already exists"));
        }
        self.tenants.insert(tenant.id, tenant);
        Ok(())
    }

    async fn update_tenant(&self, tenant: TenantRecord) -> Result<()> {
        match self.tenants.get_mut(&tenant.id) {
            Some(mut existing) => {
                *existing = tenant;
                Ok(())
            }
            None => Err(GatewayError::not_found("Tenant", tenant.id.to_string())),
        }
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Option<TenantRecord>> {
        Ok(self.tenants.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_tenants(&self) -> Result<Vec<TenantRecord>> {
        let mut tenants: Vec<_> = self.tenants.iter().map(|entry| entry.value().clone()).collect();
        tenants.sort_by_key(|tenant| tenant.created_at);
        Ok(tenants)
    }

    async fn delete_tenant(&self, id: TenantId) -> Result<bool> {
        let removed = self.tenants.remove(&id).is_some();
        self.stores.remove(&id);
        Ok(removed)
    }

    async fn insert_store(&self, store: StoreRecord) -> Result<()> {
        let mut stores = self.stores.entry(store.tenant_id).or_default();

        if stores.iter().any(|existing| existing.store_id == store.store_id) {
            return Err(GatewayError::duplicate(
                "store_id",
                format!("Store '{}' is already registered", store.store_id),
            ));
        }
        if stores
            .iter()
            .any(|existing| existing.name.eq_ignore_ascii_case(&store.name))
        {
            return Err(GatewayError::duplicate(
                "name",
                format!("Store name '{}' is already in use", store.name),
            ));
        }

        stores.push(store);
        Ok(())
    }

    async fn list_stores(&self, tenant_id: TenantId) -> Result<Vec<StoreRecord>> {
        Ok(self
            .stores
            .get(&tenant_id)
            .map(|entry| entry.value().iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_store(&self, tenant_id: TenantId, store_id: &str) -> Result<bool> {
        let Some(mut stores) = self.stores.get_mut(&tenant_id) else {
            return Ok(false);
        };
        let before = stores.len();
        stores.retain(|store| store.store_id != store_id);
        Ok(stores.len() < before)
    }
}
