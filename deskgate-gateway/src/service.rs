//! Gateway facade tying tenants, stores, rate limiting and upstream calls together.
//!
//! Every store-scoped call follows the same path: admission check for the
//! session's tenant, store resolution (explicit identifier or the session's
//! active store), just-in-time credential decryption, then the upstream call
//! on a pooled HTTP client. Reads may be answered from a short-lived cache
//! that every write through this facade invalidates; the mutation
//! coordinator always fetches from the upstream.

use std::net::IpAddr;
use std::sync::Arc;

use deskgate_core::config::GatewayConfig;
use deskgate_core::error::{GatewayError, Result};
use deskgate_core::types::{ListQuery, Page, ResourceKind, TenantId};
use deskgate_security::credentials::{CredentialRepository, CredentialStore, StoreRegistration, StoreSummary};
use deskgate_security::crypto::CryptoEngine;
use deskgate_security::rate_limit::{OperationClass, RateLimiter, Subject};
use deskgate_security::secret::Secret;
use deskgate_security::session::SessionContext;
use deskgate_security::tenant::TenantService;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{Instrument, info, warn};

use crate::cache::{CacheKey, ReadCache};
use crate::mutation::{AddressKind, Mutation, MutationCoordinator, MutationOutcome, PathOperation};
use crate::upstream::{UpstreamClient, UpstreamConfig, build_http_client};

/// Outcome of a store connection test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Upstream store ID that was tested.
    pub store_id: String,
    /// Whether the upstream accepted the credential.
    pub connected: bool,
    /// Upstream or error message.
    pub message: String,
}

/// The credential gateway.
pub struct GatewayService {
    crypto: Arc<CryptoEngine>,
    tenants: TenantService,
    stores: CredentialStore,
    limiter: Arc<RateLimiter>,
    http_client: Client,
    upstream: UpstreamConfig,
    coordinator: MutationCoordinator,
    items: ReadCache<Value>,
    pages: ReadCache<Page<Value>>,
}

impl GatewayService {
    /// Builds the gateway from configuration over the given repository.
    pub fn new(config: &GatewayConfig, repo: Arc<dyn CredentialRepository>) -> Result<Self> {
        let crypto = Arc::new(CryptoEngine::from_config(config)?);
        let upstream = UpstreamConfig::from_settings(&config.http);
        let http_client = build_http_client(&upstream)?;

        Ok(Self {
            tenants: TenantService::new(repo.clone(), crypto.clone(), config.auto_provision_tenant),
            stores: CredentialStore::new(repo, crypto.clone()),
            crypto,
            limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            http_client,
            upstream,
            coordinator: MutationCoordinator::new(&config.mutation),
            items: ReadCache::new(&config.cache),
            pages: ReadCache::new(&config.cache),
        })
    }

    /// Replaces the upstream configuration and rebuilds the HTTP client.
    pub fn with_upstream_config(mut self, upstream: UpstreamConfig) -> Result<Self> {
        self.http_client = build_http_client(&upstream)?;
        self.upstream = upstream;
        Ok(self)
    }

    /// Gets a reference to the tenant service.
    #[must_use]
    pub const fn tenants(&self) -> &TenantService {
        &self.tenants
    }

    /// Gets a reference to the credential store.
    #[must_use]
    pub const fn stores(&self) -> &CredentialStore {
        &self.stores
    }

    /// Gets a reference to the rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Gets a reference to the mutation coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    /// Gets the upstream configuration.
    #[must_use]
    pub const fn upstream_config(&self) -> &UpstreamConfig {
        &self.upstream
    }

    // Tenants

    /// Generates a fresh master secret for a new tenant.
    pub fn generate_master_secret(&self) -> Result<Secret> {
        self.crypto.generate_master_secret()
    }

    /// Authenticates a master secret and opens a session.
    ///
    /// Login attempts are limited per source address when one is given.
    pub async fn login(&self, master_secret: &Secret, source: Option<IpAddr>) -> Result<SessionContext> {
        if let Some(ip) = source {
            self.limiter.require(Subject::Source(ip), OperationClass::Login)?;
        }
        self.tenants.open_session(master_secret).await
    }

    /// Creates a tenant explicitly, regardless of auto-provisioning.
    pub async fn signup(
        &self,
        master_secret: &Secret,
        email: Option<String>,
        source: Option<IpAddr>,
    ) -> Result<SessionContext> {
        if let Some(ip) = source {
            self.limiter.require(Subject::Source(ip), OperationClass::Signup)?;
        }
        self.tenants.create_tenant(master_secret, email).await?;
        self.tenants.open_session(master_secret).await
    }

    /// Deletes the session's tenant and every store it owns.
    pub async fn delete_tenant(&self, session: SessionContext) -> Result<bool> {
        let tenant_id = session.tenant_id();
        let deleted = self.tenants.delete_tenant(session).await?;
        self.limiter.reset(Subject::Tenant(tenant_id));
        self.invalidate_tenant(tenant_id);
        Ok(deleted)
    }

    // Stores

    /// Registers an upstream store for the session's tenant.
    pub async fn register_store(
        &self,
        session: &SessionContext,
        registration: StoreRegistration,
    ) -> Result<StoreSummary> {
        self.admit(session, OperationClass::Write)?;
        self.stores.register_store(session, registration).await
    }

    /// Lists the session's stores, newest first.
    pub async fn list_stores(&self, session: &SessionContext) -> Result<Vec<StoreSummary>> {
        self.admit(session, OperationClass::Read)?;
        self.stores.list_stores(session).await
    }

    /// Selects the store used when a call names none.
    pub async fn use_store(&self, session: &mut SessionContext, identifier: &str) -> Result<StoreSummary> {
        self.admit(session, OperationClass::Read)?;
        self.stores.use_store(session, identifier).await
    }

    /// Deletes a store; false if nothing matched.
    pub async fn delete_store(&self, session: &mut SessionContext, identifier: &str) -> Result<bool> {
        self.admit(session, OperationClass::Write)?;
        let deleted = self.stores.delete_store(session, identifier).await?;
        if deleted {
            self.invalidate_tenant(session.tenant_id());
        }
        Ok(deleted)
    }

    /// Checks that a store's credential is accepted upstream.
    ///
    /// Upstream failures are reported in the status; local failures such as
    /// an unknown store or a tampered credential are returned as errors.
    pub async fn test_store(&self, session: &SessionContext, store: Option<&str>) -> Result<ConnectionStatus> {
        let client = self.client_for(session, store, OperationClass::Read).await?;
        let store_id = client.store_id().to_string();
        let status = match client.test_connection().instrument(session.span().clone()).await {
            Ok(body) => ConnectionStatus {
                store_id,
                connected: true,
                message: body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Connection successful")
                    .to_string(),
            },
            Err(e) => {
                warn!(parent: session.span(), store_id = %store_id, error = %e, "Store connection test failed");
                ConnectionStatus {
                    store_id,
                    connected: false,
                    message: e.to_string(),
                }
            }
        };
        Ok(status)
    }

    /// Retrieves the store's settings and folders.
    pub async fn store_settings(&self, session: &SessionContext, store: Option<&str>) -> Result<Value> {
        let client = self.client_for(session, store, OperationClass::Read).await?;
        client.store_settings().instrument(session.span().clone()).await
    }

    // Resources

    /// Retrieves one order or inventory item, from the cache when fresh.
    pub async fn get_resource(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Value> {
        let client = self.client_for(session, store, OperationClass::Read).await?;
        let key = CacheKey::item(session.tenant_id(), client.store_id(), kind, id);
        if let Some(cached) = self.items.get(&key) {
            return Ok(cached);
        }
        let value = client.get_resource(kind, id).instrument(session.span().clone()).await?;
        self.items.insert(key, value.clone());
        Ok(value)
    }

    /// Lists one page of orders or inventory items.
    pub async fn list_resources(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        kind: ResourceKind,
        query: &ListQuery,
    ) -> Result<Page<Value>> {
        query.validate()?;
        let client = self.client_for(session, store, OperationClass::Read).await?;
        let key = CacheKey::page(session.tenant_id(), client.store_id(), kind, &query.to_pairs());
        if let Some(cached) = self.pages.get(&key) {
            return Ok(cached);
        }
        let page = client
            .list_resources(kind, query)
            .instrument(session.span().clone())
            .await?;
        self.pages.insert(key, page.clone());
        Ok(page)
    }

    /// Creates an order or inventory item.
    pub async fn create_resource(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        kind: ResourceKind,
        body: Value,
    ) -> Result<Value> {
        let client = self.client_for(session, store, OperationClass::Write).await?;
        let result = client.create_resource(kind, body).instrument(session.span().clone()).await;
        self.invalidate(session, &client, kind);
        result
    }

    /// Deletes an order or inventory item.
    pub async fn delete_resource(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Value> {
        let client = self.client_for(session, store, OperationClass::Write).await?;
        let result = client.delete_resource(kind, id).instrument(session.span().clone()).await;
        self.invalidate(session, &client, kind);
        result
    }

    /// Applies a shallow change-set through the fetch-merge-upload workflow.
    pub async fn update_resource(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        kind: ResourceKind,
        id: &str,
        changes: Map<String, Value>,
    ) -> Result<MutationOutcome> {
        self.mutate(session, store, kind, id, Mutation::Merge(changes)).await
    }

    /// Applies path operations through the fetch-merge-upload workflow.
    pub async fn apply_operations(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        kind: ResourceKind,
        id: &str,
        operations: Vec<PathOperation>,
    ) -> Result<MutationOutcome> {
        self.mutate(session, store, kind, id, Mutation::Operations(operations)).await
    }

    /// Runs any mutation against a resource of the resolved store.
    pub async fn mutate(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        kind: ResourceKind,
        id: &str,
        mutation: Mutation,
    ) -> Result<MutationOutcome> {
        mutation.validate()?;
        let client = self.client_for(session, store, OperationClass::Write).await?;
        let result = self
            .coordinator
            .execute(&client, kind, id, &mutation)
            .instrument(session.span().clone())
            .await;
        self.invalidate(session, &client, kind);
        let outcome = result?;
        info!(
            parent: session.span(),
            resource = %kind,
            resource_id = %id,
            mutation = mutation.name(),
            attempts = outcome.attempts,
            "Resource updated"
        );
        Ok(outcome)
    }

    // Order conveniences

    /// Moves an order to another folder.
    pub async fn move_to_folder(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        order_id: &str,
        folder_id: u64,
    ) -> Result<MutationOutcome> {
        self.mutate(session, store, ResourceKind::Order, order_id, Mutation::MoveToFolder(folder_id))
            .await
    }

    /// Appends line items to an order.
    pub async fn add_items(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        order_id: &str,
        items: Vec<Value>,
    ) -> Result<MutationOutcome> {
        self.mutate(session, store, ResourceKind::Order, order_id, Mutation::AddItems(items))
            .await
    }

    /// Updates the shipping, customer or return address of an order.
    pub async fn update_address(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        order_id: &str,
        kind: AddressKind,
        address: Map<String, Value>,
    ) -> Result<MutationOutcome> {
        if address.is_empty() {
            return Err(GatewayError::missing("address"));
        }
        self.mutate(
            session,
            store,
            ResourceKind::Order,
            order_id,
            Mutation::UpdateAddress { kind, address },
        )
        .await
    }

    /// Drops cached reads for one resource kind of the client's store.
    ///
    /// Runs after failed writes too, since an upload may have landed before
    /// the error surfaced.
    fn invalidate(&self, session: &SessionContext, client: &UpstreamClient, kind: ResourceKind) {
        self.items.invalidate(session.tenant_id(), client.store_id(), kind);
        self.pages.invalidate(session.tenant_id(), client.store_id(), kind);
    }

    fn invalidate_tenant(&self, tenant_id: TenantId) {
        self.items.invalidate_tenant(tenant_id);
        self.pages.invalidate_tenant(tenant_id);
    }

    fn admit(&self, session: &SessionContext, class: OperationClass) -> Result<()> {
        self.limiter.require(Subject::Tenant(session.tenant_id()), class)
    }

    async fn client_for(
        &self,
        session: &SessionContext,
        store: Option<&str>,
        class: OperationClass,
    ) -> Result<UpstreamClient> {
        self.admit(session, class)?;
        let identifier = session.require_store_identifier(store)?;
        let credential = self.stores.resolve_credential(session, &identifier).await?;
        Ok(UpstreamClient::with_http_client(
            self.upstream.clone(),
            self.http_client.clone(),
            credential,
        ))
    }
}

impl std::fmt::Debug for GatewayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayService")
            .field("upstream", &self.upstream)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
