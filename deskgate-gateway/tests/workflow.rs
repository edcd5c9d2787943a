//! End-to-end tests: tenant provisioning, store registration, session and upstream calls.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use deskgate_core::config::{GatewayConfig, HashingSettings, MutationSettings};
use deskgate_core::error::GatewayError;
use deskgate_core::types::{ListQuery, ResourceKind};
use deskgate_gateway::mutation::{AddressKind, PathOperation};
use deskgate_gateway::service::GatewayService;
use deskgate_gateway::upstream::{API_KEY_HEADER, STORE_ID_HEADER, UpstreamConfig};
use deskgate_security::credentials::{
    CredentialRepository, MemoryRepository, SqliteRepository, StoreRegistration,
};
use deskgate_security::secret::Secret;
use deskgate_security::session::SessionContext;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::{Map, Value, json};

const MASTER: &str = "tenant-master-secret-one";

/// Builds a gateway pointed at the mock server.
fn gateway(server: &ServerGuard, max_attempts: u32) -> GatewayService {
    gateway_with(server, max_attempts, Arc::new(MemoryRepository::new()))
}

/// Builds a gateway over an existing repository.
fn gateway_over(server: &ServerGuard, repo: Arc<dyn CredentialRepository>) -> GatewayService {
    gateway_with(server, 5, repo)
}

fn gateway_with(server: &ServerGuard, max_attempts: u32, repo: Arc<dyn CredentialRepository>) -> GatewayService {
    let config = GatewayConfig {
        kms_key: Some(STANDARD.encode([42u8; 32])),
        mutation: MutationSettings {
            max_attempts,
            backoff_step_ms: 0,
        },
        hashing: HashingSettings {
            memory_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        },
        ..GatewayConfig::default()
    };
    let upstream = UpstreamConfig::builder()
        .base_url(server.url())
        .max_retries(0)
        .build();
    GatewayService::new(&config, repo)
        .unwrap()
        .with_upstream_config(upstream)
        .unwrap()
}

/// Opens a session and registers store `12345` as the active store.
async fn session_with_store(gateway: &GatewayService) -> SessionContext {
    let mut session = gateway.login(&Secret::from(MASTER), None).await.unwrap();
    gateway
        .register_store(
            &session,
            StoreRegistration::new("12345", "od-live-key").with_name("Main Shop"),
        )
        .await
        .unwrap();
    gateway.use_store(&mut session, "main shop").await.unwrap();
    session
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_get_order_uses_decrypted_credentials() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/orders/1001")
        .match_header(STORE_ID_HEADER, "12345")
        .match_header(API_KEY_HEADER, "od-live-key")
        .with_status(200)
        .with_body(r#"{"status":"success","order":{"id":"1001","email":"a@example.com"}}"#)
        .create_async()
        .await;

    let gateway = gateway(&server, 5);
    let session = session_with_store(&gateway).await;

    let order = gateway
        .get_resource(&session, None, ResourceKind::Order, "1001")
        .await
        .unwrap();

    assert_eq!(order["email"], json!("a@example.com"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_list_orders_reports_page() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/orders")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "2".into()),
            Matcher::UrlEncoded("offset".into(), "2".into()),
            Matcher::UrlEncoded("folder_id".into(), "7".into()),
        ]))
        .with_status(200)
        .with_body(r#"[{"id":"3"},{"id":"4"}]"#)
        .create_async()
        .await;

    let gateway = gateway(&server, 5);
    let session = session_with_store(&gateway).await;

    let query = ListQuery::new(2, 2).with_folder(7);
    let page = gateway
        .list_resources(&session, Some("12345"), ResourceKind::Order, &query)
        .await
        .unwrap();

    assert_eq!(page.count, 2);
    assert_eq!(page.page, 2);
    assert!(page.has_more);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_update_order_merges_onto_fetched_object() {
    let mut server = Server::new_async().await;
    let fetch = server
        .mock("GET", "/orders/1001")
        .with_status(200)
        .with_body(r#"{"order":{"id":"1001","email":"a@example.com","order_notes":"old","folder_id":1}}"#)
        .create_async()
        .await;
    let upload = server
        .mock("PUT", "/orders/1001")
        .match_body(Matcher::Json(json!({
            "id": "1001",
            "email": "b@example.com",
            "folder_id": 1
        })))
        .with_status(200)
        .with_body(r#"{"status":"success","order":{"id":"1001","email":"b@example.com","folder_id":1}}"#)
        .create_async()
        .await;

    let gateway = gateway(&server, 5);
    let session = session_with_store(&gateway).await;

    let outcome = gateway
        .update_resource(
            &session,
            None,
            ResourceKind::Order,
            "1001",
            object(json!({"email": "b@example.com", "order_notes": null})),
        )
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.resource["email"], json!("b@example.com"));
    fetch.assert_async().await;
    upload.assert_async().await;
}

#[tokio::test]
async fn test_persistent_conflict_exhausts_attempts() {
    let mut server = Server::new_async().await;
    let fetch = server
        .mock("GET", "/orders/1001")
        .with_status(200)
        .with_body(r#"{"order":{"id":"1001","folder_id":1}}"#)
        .expect(3)
        .create_async()
        .await;
    let upload = server
        .mock("PUT", "/orders/1001")
        .with_status(409)
        .with_body(r#"{"status":"error","message":"Order was modified"}"#)
        .expect(3)
        .create_async()
        .await;

    let gateway = gateway(&server, 3);
    let session = session_with_store(&gateway).await;

    let err = gateway
        .move_to_folder(&session, None, "1001", 9)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Conflict { attempts: 3 }));
    fetch.assert_async().await;
    upload.assert_async().await;
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mut server = Server::new_async().await;
    let fetch = server
        .mock("GET", "/orders/404")
        .with_status(404)
        .with_body(r#"{"status":"error","message":"Order not found"}"#)
        .expect(1)
        .create_async()
        .await;

    let gateway = gateway(&server, 5);
    let session = session_with_store(&gateway).await;

    let err = gateway
        .add_items(&session, None, "404", vec![json!({"code": "SKU1", "quantity": 1})])
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    fetch.assert_async().await;
}

#[tokio::test]
async fn test_address_and_path_operations() {
    let mut server = Server::new_async().await;
    let _fetch = server
        .mock("GET", "/orders/1001")
        .with_status(200)
        .with_body(r#"{"order":{"id":"1001","shipping":{"city":"Oslo","zip":"0150"}}}"#)
        .expect(2)
        .create_async()
        .await;
    let address_upload = server
        .mock("PUT", "/orders/1001")
        .match_body(Matcher::PartialJson(json!({"shipping": {"city": "Bergen", "zip": "0150"}})))
        .with_status(200)
        .with_body(r#"{"status":"success","order":{"id":"1001","shipping":{"city":"Bergen","zip":"0150"}}}"#)
        .create_async()
        .await;

    let gateway = gateway(&server, 5);
    let session = session_with_store(&gateway).await;

    let outcome = gateway
        .update_address(
            &session,
            None,
            "1001",
            AddressKind::Shipping,
            object(json!({"city": "Bergen"})),
        )
        .await
        .unwrap();
    assert_eq!(outcome.resource["shipping"]["city"], json!("Bergen"));
    address_upload.assert_async().await;

    let ops_upload = server
        .mock("PUT", "/orders/1001")
        .match_body(Matcher::PartialJson(json!({"checkout_data": {"gift": {"note": "hi"}}})))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    gateway
        .apply_operations(
            &session,
            None,
            ResourceKind::Order,
            "1001",
            vec![PathOperation::add("checkout_data.gift.note", json!("hi"))],
        )
        .await
        .unwrap();
    ops_upload.assert_async().await;
}

#[tokio::test]
async fn test_connection_failure_is_reported_not_raised() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/test")
        .with_status(401)
        .with_body(r#"{"status":"error","message":"Invalid API key"}"#)
        .create_async()
        .await;

    let gateway = gateway(&server, 5);
    let session = session_with_store(&gateway).await;

    let status = gateway.test_store(&session, None).await.unwrap();
    assert!(!status.connected);
    assert_eq!(status.store_id, "12345");
    assert!(!status.message.contains("od-live-key"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_tenants_cannot_see_each_other() {
    let server = Server::new_async().await;
    let gateway = gateway(&server, 5);

    let alice = gateway.login(&Secret::from("alice-master-secret-1"), None).await.unwrap();
    let bob = gateway.login(&Secret::from("bob-master-secret-22"), None).await.unwrap();

    gateway
        .register_store(&alice, StoreRegistration::new("A1", "alice-key").with_name("shop"))
        .await
        .unwrap();
    gateway
        .register_store(&bob, StoreRegistration::new("B1", "bob-key").with_name("shop"))
        .await
        .unwrap();

    let alice_store = gateway.stores().resolve_store(&alice, "shop").await.unwrap();
    let bob_store = gateway.stores().resolve_store(&bob, "shop").await.unwrap();
    assert_eq!(alice_store.store_id, "A1");
    assert_eq!(bob_store.store_id, "B1");

    let err = gateway.stores().resolve_store(&alice, "B1").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_deleting_active_store_clears_selection() {
    let server = Server::new_async().await;
    let gateway = gateway(&server, 5);
    let mut session = session_with_store(&gateway).await;

    assert!(gateway.delete_store(&mut session, "12345").await.unwrap());
    assert!(session.active_store().is_none());
    assert!(!gateway.delete_store(&mut session, "12345").await.unwrap());

    let err = gateway.store_settings(&session, None).await.unwrap_err();
    assert!(err.is_validation_error());
}

#[tokio::test]
async fn test_repeated_reads_served_from_cache() {
    let mut server = Server::new_async().await;
    let item = server
        .mock("GET", "/orders/1001")
        .with_status(200)
        .with_body(r#"{"order":{"id":"1001","email":"a@example.com"}}"#)
        .expect(1)
        .create_async()
        .await;
    let listing = server
        .mock("GET", "/orders")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"id":"1001"}]"#)
        .expect(2)
        .create_async()
        .await;

    let gateway = gateway(&server, 5);
    let session = session_with_store(&gateway).await;

    for identifier in [None, Some("12345"), Some("Main Shop")] {
        let order = gateway
            .get_resource(&session, identifier, ResourceKind::Order, "1001")
            .await
            .unwrap();
        assert_eq!(order["email"], json!("a@example.com"));
    }

    let first = ListQuery::new(10, 0);
    let second = ListQuery::new(10, 10);
    gateway.list_resources(&session, None, ResourceKind::Order, &first).await.unwrap();
    gateway.list_resources(&session, None, ResourceKind::Order, &first).await.unwrap();
    gateway.list_resources(&session, None, ResourceKind::Order, &second).await.unwrap();

    item.assert_async().await;
    listing.assert_async().await;
}

#[tokio::test]
async fn test_update_refetches_and_invalidates_cached_reads() {
    let mut server = Server::new_async().await;
    // One read to fill the cache, one coordinator fetch, one read after the update.
    let fetch = server
        .mock("GET", "/orders/1001")
        .with_status(200)
        .with_body(r#"{"order":{"id":"1001","email":"a@example.com"}}"#)
        .expect(3)
        .create_async()
        .await;
    let upload = server
        .mock("PUT", "/orders/1001")
        .with_status(200)
        .with_body(r#"{"order":{"id":"1001","email":"b@example.com"}}"#)
        .expect(1)
        .create_async()
        .await;

    let gateway = gateway(&server, 5);
    let session = session_with_store(&gateway).await;

    gateway
        .get_resource(&session, None, ResourceKind::Order, "1001")
        .await
        .unwrap();
    gateway
        .update_resource(
            &session,
            None,
            ResourceKind::Order,
            "1001",
            object(json!({"email": "b@example.com"})),
        )
        .await
        .unwrap();
    gateway
        .get_resource(&session, None, ResourceKind::Order, "1001")
        .await
        .unwrap();

    fetch.assert_async().await;
    upload.assert_async().await;
}

#[tokio::test]
async fn test_create_invalidates_cached_pages() {
    let mut server = Server::new_async().await;
    let listing = server
        .mock("GET", "/inventory-items")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"inventory_items":[{"id":"1"}]}"#)
        .expect(2)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/inventory-items")
        .with_status(200)
        .with_body(r#"{"inventory_item":{"id":"2","name":"Mug"}}"#)
        .expect(1)
        .create_async()
        .await;

    let gateway = gateway(&server, 5);
    let session = session_with_store(&gateway).await;
    let query = ListQuery::new(10, 0);

    gateway
        .list_resources(&session, None, ResourceKind::InventoryItem, &query)
        .await
        .unwrap();
    gateway
        .create_resource(&session, None, ResourceKind::InventoryItem, json!({"name": "Mug"}))
        .await
        .unwrap();
    gateway
        .list_resources(&session, None, ResourceKind::InventoryItem, &query)
        .await
        .unwrap();

    listing.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn test_stores_survive_across_gateways_on_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deskgate.db");
    let server = Server::new_async().await;

    let first = SqliteRepository::open(&path).await.unwrap();
    let gateway_a = gateway_over(&server, Arc::new(first));
    let second = SqliteRepository::open(&path).await.unwrap();
    let gateway_b = gateway_over(&server, Arc::new(second));

    let session_a = gateway_a.login(&Secret::from(MASTER), None).await.unwrap();
    let session_b = gateway_b.login(&Secret::from(MASTER), None).await.unwrap();
    assert_eq!(session_a.tenant_id(), session_b.tenant_id());

    gateway_a
        .register_store(&session_a, StoreRegistration::new("S1", "key-one"))
        .await
        .unwrap();
    gateway_b
        .register_store(&session_b, StoreRegistration::new("S2", "key-two"))
        .await
        .unwrap();

    let ids: Vec<_> = gateway_a
        .list_stores(&session_a)
        .await
        .unwrap()
        .into_iter()
        .map(|store| store.store_id)
        .collect();
    assert_eq!(ids, vec!["S2", "S1"]);

    let credential = gateway_a
        .stores()
        .resolve_credential(&session_a, "S2")
        .await
        .unwrap();
    assert_eq!(credential.api_key.expose_str(), Some("key-two"));
}
