//! Validation and environment override helpers.

use crate::error::ConfigError;

/// Collects validation errors for one configuration section.
#[derive(Debug, Default)]
pub struct Validator {
    section: Option<String>,
    errors: Vec<ConfigError>,
}

impl Validator {
    /// Creates a validator for the top-level section.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator whose errors are reported under `section`.
    #[must_use]
    pub fn for_section(section: impl Into<String>) -> Self {
        Self {
            section: Some(section.into()),
            errors: Vec::new(),
        }
    }

    fn qualified(&self, field: &str) -> String {
        match &self.section {
            Some(section) => format!("{section}.{field}"),
            None => field.to_string(),
        }
    }

    /// Requires an optional value to be present.
    pub fn require<T>(&mut self, field: &str, value: Option<&T>) -> &mut Self {
        if value.is_none() {
            self.errors.push(ConfigError::MissingField {
                field: field.to_string(),
                section: self.section.clone(),
            });
        }
        self
    }

    /// Requires a numeric value to fall within `[min, max]`.
    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        &mut self,
        field: &str,
        value: T,
        min: T,
        max: T,
    ) -> &mut Self {
        if value < min || value > max {
            self.errors.push(ConfigError::invalid_value(
                self.qualified(field),
                format!("Value {value} must be between {min} and {max}"),
            ));
        }
        self
    }

    /// Requires a URL with an http or https scheme.
    pub fn http_url(&mut self, field: &str, value: &str) -> &mut Self {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            self.errors.push(ConfigError::invalid_value(
                self.qualified(field),
                "Must be an http:// or https:// URL",
            ));
        }
        self
    }

    /// Records an error when `predicate` fails.
    pub fn check(&mut self, field: &str, predicate: bool, reason: &str) -> &mut Self {
        if !predicate {
            self.errors
                .push(ConfigError::invalid_value(self.qualified(field), reason));
        }
        self
    }

    /// Returns the first collected error, if any.
    pub fn finish(&mut self) -> Result<(), ConfigError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors.remove(0))
        }
    }
}

/// Reads environment variables into configuration fields.
///
/// Unset variables and unparsable values leave the target untouched.
pub struct EnvOverride;

impl EnvOverride {
    /// Overrides a string.
    pub fn apply_string(var_name: &str, target: &mut String) {
        if let Ok(value) = std::env::var(var_name) {
            *target = value;
        }
    }

    /// Overrides an optional string.
    pub fn apply_optional_string(var_name: &str, target: &mut Option<String>) {
        if let Ok(value) = std::env::var(var_name) {
            *target = Some(value);
        }
    }

    /// Overrides any `FromStr` value.
    pub fn apply_number<T: std::str::FromStr>(var_name: &str, target: &mut T) {
        if let Ok(value) = std::env::var(var_name)
            && let Ok(parsed) = value.trim().parse()
        {
            *target = parsed;
        }
    }

    /// Overrides a boolean, accepting `true/false`, `1/0`, `yes/no`, `on/off`.
    pub fn apply_bool(var_name: &str, target: &mut bool) {
        if let Ok(value) = std::env::var(var_name) {
            match value.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => *target = true,
                "false" | "0" | "no" | "off" => *target = false,
                _ => {}
            }
        }
    }
}
