//! HTTP transport to the upstream API with retry and backoff.

use deskgate_core::error::UpstreamError;
use deskgate_security::credentials::StoreCredential;
use deskgate_telemetry::masking::SensitiveDataMasker;
use deskgate_telemetry::spans::upstream_span;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info, warn};

use super::config::UpstreamConfig;

/// Header carrying the upstream store ID.
pub const STORE_ID_HEADER: &str = "ORDERDESK-STORE-ID";

/// Header carrying the upstream API key.
pub const API_KEY_HEADER: &str = "ORDERDESK-API-KEY";

/// Builds the shared HTTP client used by every [`UpstreamClient`].
///
/// The client holds the connection pool; credentials are attached per request.
pub fn build_http_client(config: &UpstreamConfig) -> Result<Client, UpstreamError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .map_err(|_| UpstreamError::network("Invalid user agent"))?,
    );

    Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.timeout())
        .default_headers(headers)
        .build()
        .map_err(|e| UpstreamError::network(format!("Failed to create HTTP client: {e}")))
}

/// Upstream API client bound to one store's credential.
///
/// # Example
///
/// ```ignore
/// use deskgate_gateway::upstream::{UpstreamClient, UpstreamConfig};
///
/// let client = UpstreamClient::new(UpstreamConfig::default(), credential)?;
/// let orders = client.get("/orders")
///     .query("limit", "10")
///     .send()
///     .await?;
/// ```
pub struct UpstreamClient {
    config: UpstreamConfig,
    http_client: Client,
    credential: StoreCredential,
    masker: SensitiveDataMasker,
}

impl UpstreamClient {
    /// Creates a client with its own connection pool.
    pub fn new(config: UpstreamConfig, credential: StoreCredential) -> Result<Self, UpstreamError> {
        let http_client = build_http_client(&config)?;
        Ok(Self::with_http_client(config, http_client, credential))
    }

    /// Creates a client that shares an existing connection pool.
    #[must_use]
    pub fn with_http_client(config: UpstreamConfig, http_client: Client, credential: StoreCredential) -> Self {
        Self {
            config,
            http_client,
            credential,
            masker: SensitiveDataMasker::new(),
        }
    }

    /// Creates a GET request builder.
    #[must_use]
    pub fn get(&self, path: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, path)
    }

    /// Creates a POST request builder.
    #[must_use]
    pub fn post(&self, path: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, path)
    }

    /// Creates a PUT request builder.
    #[must_use]
    pub fn put(&self, path: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, path)
    }

    /// Creates a DELETE request builder.
    #[must_use]
    pub fn delete(&self, path: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, path)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Returns the upstream store ID this client targets.
    #[must_use]
    pub fn store_id(&self) -> &str {
        &self.credential.store_id
    }

    /// Builds the full URL for a path.
    #[must_use]
    pub fn build_url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    fn auth_headers(&self) -> Result<HeaderMap, UpstreamError> {
        let mut headers = HeaderMap::new();
        let store_id = HeaderValue::from_str(&self.credential.store_id)
            .map_err(|_| UpstreamError::invalid_credential("Store ID is not a valid header value"))?;
        let mut api_key = HeaderValue::from_bytes(self.credential.api_key.expose())
            .map_err(|_| UpstreamError::invalid_credential("API key is not a valid header value"))?;
        api_key.set_sensitive(true);
        headers.insert(STORE_ID_HEADER, store_id);
        headers.insert(API_KEY_HEADER, api_key);
        Ok(headers)
    }

    async fn execute_request(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, AttemptError> {
        let mut request = self
            .http_client
            .request(method, url)
            .headers(self.auth_headers()?);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            let error = if e.is_timeout() {
                UpstreamError::timeout(self.config.timeout_ms)
            } else {
                UpstreamError::network(self.scrub(&e.to_string()))
            };
            AttemptError::from(error)
        })?;

        let status = response.status();
        if status.is_success() {
            return self.parse_success(response).await.map_err(AttemptError::from);
        }

        let retry_after = retry_after_header(&response);
        let text = response.text().await.unwrap_or_default();
        let message = self.scrub(&error_message(status, &text));
        Err(AttemptError {
            error: UpstreamError::from_status(status.as_u16(), message),
            retry_after,
        })
    }

    /// Masks credential-like assignments and any echo of this client's API key.
    fn scrub(&self, text: &str) -> String {
        let masked = self.masker.mask_string(text);
        match self.credential.api_key.expose_str() {
            Some(key) if !key.is_empty() && masked.contains(key) => masked.replace(key, "[REDACTED]"),
            _ => masked.into_owned(),
        }
    }

    async fn parse_success(&self, response: Response) -> Result<Value, UpstreamError> {
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::invalid_response(format!("Failed to read response: {e}")))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| {
            debug!("Upstream returned a non-JSON success body");
            serde_json::json!({ "status": "success", "data": text })
        }))
    }
}

impl fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.config.base_url)
            .field("store_id", &self.credential.store_id)
            .finish_non_exhaustive()
    }
}

/// Failure of a single attempt, with the server's retry hint if any.
struct AttemptError {
    error: UpstreamError,
    retry_after: Option<Duration>,
}

impl From<UpstreamError> for AttemptError {
    fn from(error: UpstreamError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// Request builder for upstream API calls.
pub struct RequestBuilder<'a> {
    client: &'a UpstreamClient,
    method: Method,
    path: String,
    query_params: Vec<(String, String)>,
    body: Option<Value>,
}

impl<'a> RequestBuilder<'a> {
    fn new(client: &'a UpstreamClient, method: Method, path: &str) -> Self {
        Self {
            client,
            method,
            path: path.to_string(),
            query_params: Vec::new(),
            body: None,
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Adds multiple query parameters.
    #[must_use]
    pub fn queries(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query_params.extend(params);
        self
    }

    /// Sets the JSON request body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sends the request, retrying transient failures, and returns the parsed body.
    ///
    /// Rate limiting, 5xx, timeouts and network errors are retried with
    /// exponential backoff and jitter; other failures return immediately.
    pub async fn send(self) -> Result<Value, UpstreamError> {
        let span = upstream_span(self.method.as_str(), &self.path, self.client.store_id());
        let path = self.path.clone();
        self.send_with_retry()
            .instrument(span)
            .await
            .map_err(|e| e.with_resource(path.trim_start_matches('/')))
    }

    async fn send_with_retry(self) -> Result<Value, UpstreamError> {
        let config = &self.client.config;
        let url = self.client.build_url(&self.path);
        let body = self.body.as_ref();

        let mut attempt = 0u32;
        loop {
            let started = Instant::now();
            let result = self
                .client
                .execute_request(self.method.clone(), &url, &self.query_params, body)
                .await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(value) => {
                    info!(attempt = attempt + 1, elapsed_ms, outcome = "success", "Upstream call completed");
                    return Ok(value);
                }
                Err(AttemptError { error, retry_after }) => {
                    let status = error.status.unwrap_or(0);
                    if error.is_retryable() && config.should_retry(attempt) {
                        let backoff = config.jittered_retry_delay(attempt, &mut rand::thread_rng());
                        let delay = retry_after
                            .map_or(backoff, |hint| hint.min(config.max_retry_delay()));
                        warn!(
                            attempt = attempt + 1,
                            elapsed_ms,
                            status,
                            code = %error.code,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Upstream call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    warn!(
                        attempt = attempt + 1,
                        elapsed_ms,
                        status,
                        code = %error.code,
                        error = %error.message,
                        "Upstream call failed"
                    );
                    return Err(error);
                }
            }
        }
    }
}

/// Extracts the most useful error message from an upstream error body.
///
/// Prefers a JSON `message` then `error` field, then the raw text, then
/// `HTTP {status}`.
#[must_use]
pub fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = json.get(key).and_then(Value::as_str) {
                if !message.trim().is_empty() {
                    return message.to_string();
                }
            }
        }
    }
    if body.trim().is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        body.trim().to_string()
    }
}

fn retry_after_header(response: &Response) -> Option<Duration> {
    ["retry-after", "x-retry-after"]
        .iter()
        .find_map(|name| response.headers().get(*name))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskgate_core::error::UpstreamErrorCode;
    use deskgate_security::secret::Secret;
    use mockito::{Matcher, Server};

    fn credential() -> StoreCredential {
        StoreCredential {
            store_id: "12345".to_string(),
            api_key: Secret::from("od-secret-key"),
        }
    }

    fn client(base_url: &str, max_retries: u32) -> UpstreamClient {
        let config = UpstreamConfig::builder()
            .base_url(base_url)
            .max_retries(max_retries)
            .retry_delay_ms(1)
            .max_retry_delay_ms(5)
            .build();
        UpstreamClient::new(config, credential()).unwrap()
    }

    #[test]
    fn test_build_url() {
        let client = client("https://app.orderdesk.me/api/v2/", 0);
        assert_eq!(client.build_url("/orders"), "https://app.orderdesk.me/api/v2/orders");
        assert_eq!(client.build_url("orders/1"), "https://app.orderdesk.me/api/v2/orders/1");
    }

    #[test]
    fn test_error_message_extraction() {
        let status = StatusCode::BAD_REQUEST;
        assert_eq!(error_message(status, r#"{"message":"Bad field"}"#), "Bad field");
        assert_eq!(error_message(status, r#"{"error":"Nope"}"#), "Nope");
        assert_eq!(error_message(status, "plain text"), "plain text");
        assert_eq!(error_message(status, ""), "HTTP 400");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = client("http://localhost", 0);
        assert!(!format!("{client:?}").contains("od-secret-key"));
    }

    #[tokio::test]
    async fn test_sends_auth_headers_and_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/orders")
            .match_header(STORE_ID_HEADER, "12345")
            .match_header(API_KEY_HEADER, "od-secret-key")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "10".into()),
                Matcher::UrlEncoded("offset".into(), "0".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"status":"success","orders":[]}"#)
            .create_async()
            .await;

        let client = client(&server.url(), 0);
        let value = client
            .get("/orders")
            .query("limit", "10")
            .query("offset", "0")
            .send()
            .await
            .unwrap();

        assert_eq!(value["status"], "success");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/orders/1")
            .with_status(500)
            .with_body(r#"{"message":"boom"}"#)
            .expect(3)
            .create_async()
            .await;

        let client = client(&server.url(), 2);
        let err = client.get("/orders/1").send().await.unwrap_err();

        assert_eq!(err.code, UpstreamErrorCode::InternalError);
        assert_eq!(err.status, Some(500));
        assert_eq!(err.message, "boom");
        assert_eq!(err.resource.as_deref(), Some("orders/1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retries_rate_limited() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/test")
            .with_status(429)
            .with_header("Retry-After", "0")
            .expect(2)
            .create_async()
            .await;

        let client = client(&server.url(), 1);
        let err = client.get("/test").send().await.unwrap_err();
        assert_eq!(err.code, UpstreamErrorCode::RateLimited);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unencodable_credential_fails_without_retry() {
        let mut server = Server::new_async().await;
        let mock = server.mock("GET", "/test").expect(0).create_async().await;

        let config = UpstreamConfig::builder()
            .base_url(server.url())
            .max_retries(3)
            .retry_delay_ms(1)
            .build();
        let credential = StoreCredential {
            store_id: "12345".to_string(),
            api_key: Secret::from("bad\nkey"),
        };
        let client = UpstreamClient::new(config, credential).unwrap();

        let err = client.get("/test").send().await.unwrap_err();
        assert_eq!(err.code, UpstreamErrorCode::InvalidCredential);
        assert!(!err.is_retryable());
        assert!(!err.message.contains("bad"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/orders/1")
            .with_status(404)
            .with_body(r#"{"message":"Order not found"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url(), 3);
        let err = client
            .put("/orders/1")
            .json(serde_json::json!({"id": "1"}))
            .send()
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_message_masks_secrets() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/store")
            .with_status(401)
            .with_body(r#"{"message":"Invalid api_key=od-secret-key"}"#)
            .create_async()
            .await;

        let client = client(&server.url(), 0);
        let err = client.get("/store").send().await.unwrap_err();
        assert_eq!(err.status, Some(401));
        assert!(!err.message.contains("od-secret-key"));
    }

    #[tokio::test]
    async fn test_error_message_scrubs_echoed_key() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/store")
            .with_status(403)
            .with_body("key od-secret-key is disabled")
            .create_async()
            .await;

        let client = client(&server.url(), 0);
        let err = client.get("/store").send().await.unwrap_err();
        assert_eq!(err.message, "key [REDACTED] is disabled");
    }

    #[tokio::test]
    async fn test_non_json_success_body() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/orders/9")
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;

        let client = client(&server.url(), 0);
        let value = client.delete("/orders/9").send().await.unwrap();
        assert_eq!(value["data"], "OK");
    }

    #[tokio::test]
    async fn test_network_error_is_retryable() {
        let client = client("http://127.0.0.1:9", 0);
        let err = client.get("/test").send().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
