//! Resource-level operations on orders and inventory items.

use async_trait::async_trait;
use deskgate_core::error::{GatewayError, Result};
use deskgate_core::types::{ListQuery, Page, ResourceKind};
use serde_json::Value;
use tracing::warn;

use super::client::UpstreamClient;

/// Fetch and full-replace access to upstream resources.
///
/// This is the seam the mutation workflow runs against; tests substitute
/// in-memory implementations.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Retrieves the complete current object.
    async fn fetch(&self, kind: ResourceKind, id: &str) -> Result<Value>;

    /// Replaces the whole object and returns the upstream's view of it.
    async fn replace(&self, kind: ResourceKind, id: &str, body: Value) -> Result<Value>;
}

/// Checks that a resource ID is non-empty and safe to place in a path.
pub fn validate_resource_id(kind: ResourceKind, id: &str) -> Result<()> {
    let field = match kind {
        ResourceKind::Order => "order_id",
        ResourceKind::InventoryItem => "product_id",
    };
    if id.trim().is_empty() {
        return Err(GatewayError::missing(field));
    }
    if id.chars().any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace()) {
        return Err(GatewayError::invalid(field, format!("Invalid {} ID: {id}", kind.label())));
    }
    Ok(())
}

/// Unwraps a single-item response such as `{"status": "success", "order": {...}}`.
#[must_use]
pub fn unwrap_item(kind: ResourceKind, value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove(kind.item_key()) {
            Some(item @ Value::Object(_)) => item,
            Some(other) => {
                map.insert(kind.item_key().to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

/// Extracts list items from either a bare array or an object wrapping one.
#[must_use]
pub fn extract_items(kind: ResourceKind, value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(kind.list_key()) {
            Some(Value::Array(items)) => items,
            _ => {
                warn!(resource = %kind, "Unexpected list response format");
                Vec::new()
            }
        },
        _ => {
            warn!(resource = %kind, "Unexpected list response format");
            Vec::new()
        }
    }
}

impl UpstreamClient {
    /// Retrieves one resource.
    pub async fn get_resource(&self, kind: ResourceKind, id: &str) -> Result<Value> {
        validate_resource_id(kind, id)?;
        let value = self.get(&kind.item_path(id)).send().await?;
        Ok(unwrap_item(kind, value))
    }

    /// Lists one page of resources.
    pub async fn list_resources(&self, kind: ResourceKind, query: &ListQuery) -> Result<Page<Value>> {
        query.validate()?;
        let value = self
            .get(kind.collection_path())
            .queries(query.to_pairs())
            .send()
            .await?;
        Ok(Page::from_items(extract_items(kind, value), query))
    }

    /// Creates a resource.
    pub async fn create_resource(&self, kind: ResourceKind, body: Value) -> Result<Value> {
        if !body.is_object() {
            return Err(GatewayError::invalid("body", format!("{} must be a JSON object", kind.label())));
        }
        let value = self.post(kind.collection_path()).json(body).send().await?;
        Ok(unwrap_item(kind, value))
    }

    /// Replaces a resource with a complete object.
    pub async fn replace_resource(&self, kind: ResourceKind, id: &str, body: Value) -> Result<Value> {
        validate_resource_id(kind, id)?;
        let value = self.put(&kind.item_path(id)).json(body).send().await?;
        Ok(unwrap_item(kind, value))
    }

    /// Deletes a resource.
    pub async fn delete_resource(&self, kind: ResourceKind, id: &str) -> Result<Value> {
        validate_resource_id(kind, id)?;
        Ok(self.delete(&kind.item_path(id)).send().await?)
    }

    /// Retrieves store settings and folders.
    pub async fn store_settings(&self) -> Result<Value> {
        Ok(self.get("/store").send().await?)
    }

    /// Checks that the credential is accepted.
    pub async fn test_connection(&self) -> Result<Value> {
        Ok(self.get("/test").send().await?)
    }
}

#[async_trait]
impl ResourceApi for UpstreamClient {
    async fn fetch(&self, kind: ResourceKind, id: &str) -> Result<Value> {
        self.get_resource(kind, id).await
    }

    async fn replace(&self, kind: ResourceKind, id: &str, body: Value) -> Result<Value> {
        self.replace_resource(kind, id, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamConfig;
    use deskgate_security::credentials::StoreCredential;
    use deskgate_security::secret::Secret;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(base_url: &str) -> UpstreamClient {
        let config = UpstreamConfig::builder().base_url(base_url).max_retries(0).build();
        let credential = StoreCredential {
            store_id: "12345".to_string(),
            api_key: Secret::from("od-key"),
        };
        UpstreamClient::new(config, credential).unwrap()
    }

    #[test]
    fn test_validate_resource_id() {
        assert!(validate_resource_id(ResourceKind::Order, "123").is_ok());
        assert!(validate_resource_id(ResourceKind::Order, "").is_err());
        assert!(validate_resource_id(ResourceKind::Order, "1/2").is_err());
        assert!(validate_resource_id(ResourceKind::InventoryItem, "a b").is_err());
    }

    #[test]
    fn test_unwrap_item() {
        let wrapped = json!({"status": "success", "order": {"id": "1"}});
        assert_eq!(unwrap_item(ResourceKind::Order, wrapped), json!({"id": "1"}));

        let bare = json!({"id": "1", "email": "a@b.c"});
        assert_eq!(unwrap_item(ResourceKind::Order, bare.clone()), bare);
    }

    #[test]
    fn test_extract_items_formats() {
        let bare = json!([{"id": "1"}, {"id": "2"}]);
        assert_eq!(extract_items(ResourceKind::Order, bare).len(), 2);

        let wrapped = json!({"status": "success", "orders": [{"id": "1"}]});
        assert_eq!(extract_items(ResourceKind::Order, wrapped).len(), 1);

        let items = json!({"inventory_items": [{"id": "x"}]});
        assert_eq!(extract_items(ResourceKind::InventoryItem, items).len(), 1);

        assert!(extract_items(ResourceKind::Order, json!({"unexpected": true})).is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_pagination() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/orders")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "2".into()),
                Matcher::UrlEncoded("offset".into(), "4".into()),
                Matcher::UrlEncoded("status".into(), "open".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"status":"success","orders":[{"id":"5"},{"id":"6"}]}"#)
            .create_async()
            .await;

        let page = client(&server.url())
            .list_resources(ResourceKind::Order, &ListQuery::new(2, 4).with_status("open"))
            .await
            .unwrap();

        assert_eq!(page.count, 2);
        assert_eq!(page.page, 3);
        assert!(page.has_more);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_rejects_bad_limit_without_calling_upstream() {
        let mut server = Server::new_async().await;
        let mock = server.mock("GET", "/orders").expect(0).create_async().await;

        let err = client(&server.url())
            .list_resources(ResourceKind::Order, &ListQuery::new(0, 0))
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_inventory_item() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/inventory-items/SKU1")
            .with_status(200)
            .with_body(r#"{"status":"success","inventory_item":{"id":"SKU1","stock":4}}"#)
            .create_async()
            .await;

        let item = client(&server.url())
            .get_resource(ResourceKind::InventoryItem, "SKU1")
            .await
            .unwrap();
        assert_eq!(item, json!({"id": "SKU1", "stock": 4}));
    }

    #[tokio::test]
    async fn test_create_requires_object() {
        let server = Server::new_async().await;
        let err = client(&server.url())
            .create_resource(ResourceKind::Order, json!([1, 2]))
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_upstream_not_found_preserved() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/orders/404")
            .with_status(404)
            .with_body(r#"{"message":"Order not found"}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .get_resource(ResourceKind::Order, "404")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.as_upstream().is_some());
    }
}
