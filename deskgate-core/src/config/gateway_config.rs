//! Gateway configuration structures.
//!
//! # Example YAML
//!
//! ```yaml
//! kms_key: "base64-encoded-32-byte-root-key"
//! auto_provision_tenant: true
//! rate_limit:
//!   tenant_rpm: 120
//!   login_rpm: 5
//! http:
//!   timeout_ms: 60000
//!   max_retries: 3
//! mutation:
//!   max_attempts: 5
//! cache:
//!   order_ttl_secs: 15
//!   product_ttl_secs: 60
//! ```

use super::traits::{Configurable, Validatable};
use super::validation::{EnvOverride, Validator};
use crate::error::ConfigError;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Minimum decoded length of the KMS root key.
pub const MIN_KMS_KEY_BYTES: usize = 32;

/// Decodes a base64 KMS root key and checks its length.
///
/// Both URL-safe and standard alphabets are accepted, with or without padding.
pub fn decode_kms_key(encoded: &str) -> Result<Vec<u8>, ConfigError> {
    let encoded = encoded.trim();
    let bytes = [URL_SAFE, URL_SAFE_NO_PAD, STANDARD, STANDARD_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(encoded).ok())
        .ok_or_else(|| ConfigError::invalid_value("kms_key", "must be valid base64"))?;

    if bytes.len() < MIN_KMS_KEY_BYTES {
        return Err(ConfigError::invalid_value(
            "kms_key",
            format!(
                "must decode to at least {MIN_KMS_KEY_BYTES} bytes, got {}",
                bytes.len()
            ),
        ));
    }
    Ok(bytes)
}

/// Top-level gateway configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base64 KMS root key mixed into every tenant key derivation.
    #[serde(default, skip_serializing)]
    pub kms_key: Option<String>,

    /// Create a tenant on first authentication with an unknown master secret.
    #[serde(default = "default_true")]
    pub auto_provision_tenant: bool,

    /// Token bucket base rates.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Upstream HTTP transport.
    #[serde(default)]
    pub http: HttpSettings,

    /// Fetch-merge-upload retry policy.
    #[serde(default)]
    pub mutation: MutationSettings,

    /// Master secret hashing cost.
    #[serde(default)]
    pub hashing: HashingSettings,

    /// Upstream read cache.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Path of the SQLite credential database used by the CLI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kms_key: None,
            auto_provision_tenant: true,
            rate_limit: RateLimitSettings::default(),
            http: HttpSettings::default(),
            mutation: MutationSettings::default(),
            hashing: HashingSettings::default(),
            cache: CacheSettings::default(),
            logging: LoggingSettings::default(),
            state_path: None,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("kms_key", &self.kms_key.as_ref().map(|_| "[REDACTED]"))
            .field("auto_provision_tenant", &self.auto_provision_tenant)
            .field("rate_limit", &self.rate_limit)
            .field("http", &self.http)
            .field("mutation", &self.mutation)
            .field("hashing", &self.hashing)
            .field("cache", &self.cache)
            .field("logging", &self.logging)
            .field("state_path", &self.state_path)
            .finish()
    }
}

impl GatewayConfig {
    /// Returns the decoded KMS root key.
    pub fn kms_key_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        let encoded = self
            .kms_key
            .as_deref()
            .ok_or_else(|| ConfigError::missing_field("kms_key"))?;
        decode_kms_key(encoded)
    }
}

impl Validatable for GatewayConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.kms_key_bytes()?;
        self.rate_limit.validate()?;
        self.http.validate()?;
        self.mutation.validate()?;
        self.hashing.validate()?;
        self.cache.validate()
    }
}

impl Configurable for GatewayConfig {
    fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_optional_string(&format!("{prefix}_KMS_KEY"), &mut self.kms_key);
        EnvOverride::apply_bool(
            &format!("{prefix}_AUTO_PROVISION_TENANT"),
            &mut self.auto_provision_tenant,
        );
        EnvOverride::apply_optional_string(&format!("{prefix}_STATE_PATH"), &mut self.state_path);
        EnvOverride::apply_bool(&format!("{prefix}_RATE_LIMIT_ENABLED"), &mut self.rate_limit.enabled);
        EnvOverride::apply_number(&format!("{prefix}_RATE_LIMIT_RPM"), &mut self.rate_limit.tenant_rpm);
        EnvOverride::apply_string(&format!("{prefix}_BASE_URL"), &mut self.http.base_url);
        EnvOverride::apply_number(&format!("{prefix}_HTTP_TIMEOUT_MS"), &mut self.http.timeout_ms);
        EnvOverride::apply_number(&format!("{prefix}_HTTP_MAX_RETRIES"), &mut self.http.max_retries);
        EnvOverride::apply_number(
            &format!("{prefix}_MUTATION_MAX_RETRIES"),
            &mut self.mutation.max_attempts,
        );
        EnvOverride::apply_bool(&format!("{prefix}_CACHE_ENABLED"), &mut self.cache.enabled);
        EnvOverride::apply_string(&format!("{prefix}_LOG_LEVEL"), &mut self.logging.level);
    }

    fn env_var_names(prefix: &str) -> Vec<String> {
        [
            "KMS_KEY",
            "AUTO_PROVISION_TENANT",
            "STATE_PATH",
            "RATE_LIMIT_ENABLED",
            "RATE_LIMIT_RPM",
            "BASE_URL",
            "HTTP_TIMEOUT_MS",
            "HTTP_MAX_RETRIES",
            "MUTATION_MAX_RETRIES",
            "CACHE_ENABLED",
            "LOG_LEVEL",
        ]
        .iter()
        .map(|name| format!("{prefix}_{name}"))
        .collect()
    }
}

/// Base rates for each token bucket family, in requests per minute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Disable to admit every request.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-tenant API calls.
    #[serde(default = "default_tenant_rpm")]
    pub tenant_rpm: u32,
    /// Per-source-IP login attempts.
    #[serde(default = "default_login_rpm")]
    pub login_rpm: u32,
    /// Per-source-IP signup attempts.
    #[serde(default = "default_signup_rpm")]
    pub signup_rpm: u32,
    /// Per-tenant-or-IP admin console calls.
    #[serde(default = "default_console_rpm")]
    pub console_rpm: u32,
}

fn default_tenant_rpm() -> u32 {
    120
}

fn default_login_rpm() -> u32 {
    5
}

fn default_signup_rpm() -> u32 {
    2
}

fn default_console_rpm() -> u32 {
    30
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tenant_rpm: default_tenant_rpm(),
            login_rpm: default_login_rpm(),
            signup_rpm: default_signup_rpm(),
            console_rpm: default_console_rpm(),
        }
    }
}

impl Validatable for RateLimitSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        Validator::for_section("rate_limit")
            .in_range("tenant_rpm", self.tenant_rpm, 1, 100_000)
            .in_range("login_rpm", self.login_rpm, 1, 100_000)
            .in_range("signup_rpm", self.signup_rpm, 1, 100_000)
            .in_range("console_rpm", self.console_rpm, 1, 100_000)
            .finish()
    }
}

/// Upstream HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Versioned API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// Relative jitter applied to each backoff delay.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_base_url() -> String {
    "https://app.orderdesk.me/api/v2".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    15_000
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_jitter() -> f64 {
    0.25
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl HttpSettings {
    /// Returns the request timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the connect timeout as a Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Validatable for HttpSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        Validator::for_section("http")
            .http_url("base_url", &self.base_url)
            .in_range("connect_timeout_ms", self.connect_timeout_ms, 1, 600_000)
            .in_range("timeout_ms", self.timeout_ms, 1, 600_000)
            .in_range("max_retries", self.max_retries, 0, 10)
            .check(
                "max_retry_delay_ms",
                self.max_retry_delay_ms >= self.retry_delay_ms,
                "must not be below retry_delay_ms",
            )
            .check(
                "jitter",
                (0.0..1.0).contains(&self.jitter),
                "must be within [0, 1)",
            )
            .finish()
    }
}

/// Fetch-merge-upload retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationSettings {
    /// Total fetch-merge-upload cycles before reporting a conflict.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay step in milliseconds; attempt `n` waits `n * backoff_step_ms`.
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_step_ms() -> u64 {
    100
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_ms: default_backoff_step_ms(),
        }
    }
}

impl Validatable for MutationSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        Validator::for_section("mutation")
            .in_range("max_attempts", self.max_attempts, 1, 50)
            .in_range("backoff_step_ms", self.backoff_step_ms, 0, 60_000)
            .finish()
    }
}

/// Argon2id cost parameters for master secret hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingSettings {
    /// Memory cost in KiB.
    #[serde(default = "default_memory_cost")]
    pub memory_cost_kib: u32,
    /// Iterations.
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,
    /// Lanes.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_cost() -> u32 {
    19_456
}

fn default_time_cost() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

impl Default for HashingSettings {
    fn default() -> Self {
        Self {
            memory_cost_kib: default_memory_cost(),
            time_cost: default_time_cost(),
            parallelism: default_parallelism(),
        }
    }
}

impl Validatable for HashingSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        Validator::for_section("hashing")
            .in_range("memory_cost_kib", self.memory_cost_kib, 8, 4 * 1024 * 1024)
            .in_range("time_cost", self.time_cost, 1, 64)
            .in_range("parallelism", self.parallelism, 1, 64)
            .finish()
    }
}

/// Read cache settings for upstream orders and inventory items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Serve repeated reads from the cache.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lifetime of cached orders and order pages, in seconds.
    #[serde(default = "default_order_ttl_secs")]
    pub order_ttl_secs: u64,
    /// Lifetime of cached inventory items and pages, in seconds.
    #[serde(default = "default_product_ttl_secs")]
    pub product_ttl_secs: u64,
    /// Maximum cached entries; least recently used entries are evicted first.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_order_ttl_secs() -> u64 {
    15
}

fn default_product_ttl_secs() -> u64 {
    60
}

fn default_cache_capacity() -> usize {
    1024
}

impl CacheSettings {
    /// Lifetime of cached orders.
    #[must_use]
    pub const fn order_ttl(&self) -> Duration {
        Duration::from_secs(self.order_ttl_secs)
    }

    /// Lifetime of cached inventory items.
    #[must_use]
    pub const fn product_ttl(&self) -> Duration {
        Duration::from_secs(self.product_ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            order_ttl_secs: default_order_ttl_secs(),
            product_ttl_secs: default_product_ttl_secs(),
            capacity: default_cache_capacity(),
        }
    }
}

impl Validatable for CacheSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        Validator::for_section("cache")
            .in_range("order_ttl_secs", self.order_ttl_secs, 0, 3600)
            .in_range("product_ttl_secs", self.product_ttl_secs, 0, 3600)
            .in_range("capacity", self.capacity, 1, 1_000_000)
            .finish()
    }
}

/// Logging output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level filter; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `json` or `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for daily-rotated log files; stdout only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
        }
    }
}
