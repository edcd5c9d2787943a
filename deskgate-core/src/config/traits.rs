//! Configuration traits for validation and environment overrides.

use crate::error::ConfigError;

/// Types that can check their own invariants after loading.
///
/// # Example
///
/// ```rust
/// use deskgate_core::config::Validatable;
/// use deskgate_core::error::ConfigError;
///
/// struct PoolConfig {
///     size: u32,
/// }
///
/// impl Validatable for PoolConfig {
///     fn validate(&self) -> Result<(), ConfigError> {
///         if self.size == 0 {
///             return Err(ConfigError::invalid_value("size", "must be positive"));
///         }
///         Ok(())
///     }
/// }
///
/// assert!(PoolConfig { size: 0 }.validate().is_err());
/// ```
pub trait Validatable {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Types whose values can be overridden from environment variables.
pub trait Configurable: Sized {
    /// Applies environment overrides using `prefix` (e.g. `DESKGATE`).
    fn apply_env_overrides(&mut self, prefix: &str);

    /// Lists the environment variables consulted for `prefix`.
    fn env_var_names(prefix: &str) -> Vec<String>;
}
