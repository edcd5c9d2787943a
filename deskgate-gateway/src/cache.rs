//! Short-lived cache for upstream reads.
//!
//! Entries are scoped to a tenant, an upstream store and a resource kind, and
//! expire after a per-kind lifetime. Any write to a scope drops every entry in
//! it, so a read after a write always goes upstream.

use std::num::NonZeroUsize;
use std::time::Duration;

use deskgate_core::config::CacheSettings;
use deskgate_core::types::{ResourceKind, TenantId};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Cache key: the scope plus a lookup discriminator within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tenant_id: TenantId,
    store_id: String,
    kind: ResourceKind,
    lookup: String,
}

impl CacheKey {
    /// Key for a single resource.
    #[must_use]
    pub fn item(tenant_id: TenantId, store_id: &str, kind: ResourceKind, id: &str) -> Self {
        Self {
            tenant_id,
            store_id: store_id.to_string(),
            kind,
            lookup: format!("item:{id}"),
        }
    }

    /// Key for one page of a listing; `params` are the query pairs.
    #[must_use]
    pub fn page(tenant_id: TenantId, store_id: &str, kind: ResourceKind, params: &[(String, String)]) -> Self {
        let mut params = params.to_vec();
        params.sort();
        let lookup = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        Self {
            tenant_id,
            store_id: store_id.to_string(),
            kind,
            lookup: format!("page:{lookup}"),
        }
    }

    fn in_scope(&self, tenant_id: TenantId, store_id: Option<&str>, kind: Option<ResourceKind>) -> bool {
        self.tenant_id == tenant_id
            && store_id.is_none_or(|s| self.store_id == s)
            && kind.is_none_or(|k| self.kind == k)
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// LRU cache with per-kind expiry.
pub struct ReadCache<V> {
    entries: Mutex<LruCache<CacheKey, Entry<V>>>,
    enabled: bool,
    order_ttl: Duration,
    product_ttl: Duration,
}

impl<V: Clone> ReadCache<V> {
    /// Creates a cache from settings.
    #[must_use]
    pub fn new(settings: &CacheSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            enabled: settings.enabled,
            order_ttl: settings.order_ttl(),
            product_ttl: settings.product_ttl(),
        }
    }

    fn ttl(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Order => self.order_ttl,
            ResourceKind::InventoryItem => self.product_ttl,
        }
    }

    /// Returns a live entry, dropping it if expired.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.enabled {
            return None;
        }
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                trace!(resource = %key.kind, lookup = %key.lookup, "Cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Stores a value under the lifetime of its resource kind.
    pub fn insert(&self, key: CacheKey, value: V) {
        let ttl = self.ttl(key.kind);
        if !self.enabled || ttl.is_zero() {
            return;
        }
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().put(key, entry);
    }

    /// Drops every entry of one resource kind in one store.
    pub fn invalidate(&self, tenant_id: TenantId, store_id: &str, kind: ResourceKind) {
        self.remove_where(|key| key.in_scope(tenant_id, Some(store_id), Some(kind)));
    }

    /// Drops every entry belonging to a tenant.
    pub fn invalidate_tenant(&self, tenant_id: TenantId) {
        self.remove_where(|key| key.in_scope(tenant_id, None, None));
    }

    fn remove_where(&self, matches: impl Fn(&CacheKey) -> bool) {
        let mut entries = self.entries.lock();
        let stale: Vec<CacheKey> = entries.iter().map(|(k, _)| k).filter(|k| matches(*k)).cloned().collect();
        for key in &stale {
            entries.pop(key);
        }
        if !stale.is_empty() {
            trace!(dropped = stale.len(), "Cache entries invalidated");
        }
    }

    /// Returns the number of entries, live or expired.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ReadCache<u32> {
        ReadCache::new(&CacheSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_per_kind() {
        let cache = cache();
        let tenant = TenantId::generate();
        let order = CacheKey::item(tenant, "S1", ResourceKind::Order, "1");
        let product = CacheKey::item(tenant, "S1", ResourceKind::InventoryItem, "1");
        cache.insert(order.clone(), 1);
        cache.insert(product.clone(), 2);

        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(cache.get(&order), None);
        assert_eq!(cache.get(&product), Some(2));

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(cache.get(&product), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidation_is_scoped() {
        let cache = cache();
        let tenant = TenantId::generate();
        let other = TenantId::generate();
        cache.insert(CacheKey::item(tenant, "S1", ResourceKind::Order, "1"), 1);
        cache.insert(CacheKey::page(tenant, "S1", ResourceKind::Order, &[]), 2);
        cache.insert(CacheKey::item(tenant, "S1", ResourceKind::InventoryItem, "1"), 3);
        cache.insert(CacheKey::item(tenant, "S2", ResourceKind::Order, "1"), 4);
        cache.insert(CacheKey::item(other, "S1", ResourceKind::Order, "1"), 5);

        cache.invalidate(tenant, "S1", ResourceKind::Order);
        assert_eq!(cache.get(&CacheKey::item(tenant, "S1", ResourceKind::Order, "1")), None);
        assert_eq!(cache.get(&CacheKey::page(tenant, "S1", ResourceKind::Order, &[])), None);
        assert_eq!(cache.get(&CacheKey::item(tenant, "S1", ResourceKind::InventoryItem, "1")), Some(3));
        assert_eq!(cache.get(&CacheKey::item(tenant, "S2", ResourceKind::Order, "1")), Some(4));
        assert_eq!(cache.get(&CacheKey::item(other, "S1", ResourceKind::Order, "1")), Some(5));

        cache.invalidate_tenant(tenant);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_page_key_ignores_param_order() {
        let tenant = TenantId::generate();
        let a = vec![("limit".to_string(), "10".to_string()), ("offset".to_string(), "0".to_string())];
        let b = vec![("offset".to_string(), "0".to_string()), ("limit".to_string(), "10".to_string())];
        assert_eq!(
            CacheKey::page(tenant, "S1", ResourceKind::Order, &a),
            CacheKey::page(tenant, "S1", ResourceKind::Order, &b)
        );
        assert_ne!(
            CacheKey::page(tenant, "S1", ResourceKind::Order, &a),
            CacheKey::page(tenant, "S1", ResourceKind::Order, &a[..1])
        );
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache: ReadCache<u32> = ReadCache::new(&CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        });
        let key = CacheKey::item(TenantId::generate(), "S1", ResourceKind::Order, "1");
        cache.insert(key.clone(), 1);
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache: ReadCache<u32> = ReadCache::new(&CacheSettings {
            capacity: 2,
            ..CacheSettings::default()
        });
        let tenant = TenantId::generate();
        let key = |id: &str| CacheKey::item(tenant, "S1", ResourceKind::InventoryItem, id);
        cache.insert(key("1"), 1);
        cache.insert(key("2"), 2);
        assert_eq!(cache.get(&key("1")), Some(1));
        cache.insert(key("3"), 3);
        assert_eq!(cache.get(&key("2")), None);
        assert_eq!(cache.get(&key("1")), Some(1));
    }
}
