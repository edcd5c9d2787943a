//! Configuration management.
//!
//! - YAML, TOML and JSON files, detected by extension
//! - `DESKGATE_*` environment overrides
//! - Validation with field-qualified error messages
//!
//! ```rust,ignore
//! use deskgate_core::config::{ConfigLoader, GatewayConfig};
//!
//! let config: GatewayConfig = ConfigLoader::new()
//!     .with_env_prefix("DESKGATE")
//!     .load("deskgate.toml")?;
//! ```

mod gateway_config;
mod loader;
mod traits;
mod validation;

pub use gateway_config::{
    CacheSettings, GatewayConfig, HashingSettings, HttpSettings, LoggingSettings, MIN_KMS_KEY_BYTES,
    MutationSettings, RateLimitSettings, decode_kms_key,
};
pub use loader::{ConfigFormat, ConfigLoader};
pub use traits::{Configurable, Validatable};
pub use validation::{EnvOverride, Validator};
pub use crate::error::ConfigError;

/// Environment variable prefix used by every deskgate binary.
pub const ENV_PREFIX: &str = "DESKGATE";
