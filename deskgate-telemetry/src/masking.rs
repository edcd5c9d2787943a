//! Sensitive data masking for logs and error messages.
//!
//! Upstream error bodies and free-form diagnostics may echo credentials
//! back. Everything that reaches a log line or an error message passes
//! through [`SensitiveDataMasker`] first.

use regex::{Captures, Regex};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::LazyLock;

/// JSON keys whose values are always replaced wholesale.
pub const REDACTED_KEYS: &[&str] = &[
    "master_key",
    "master_secret",
    "api_key",
    "api_key_ciphertext",
    "api_key_tag",
    "api_key_nonce",
    "kms_key",
    "tenant_key",
    "password",
    "token",
    "secret",
    "authorization",
    "orderdesk-api-key",
];

const REDACTED: &str = "[REDACTED]";

/// Patterns for detecting sensitive assignments in free text.
static PATTERNS: LazyLock<Vec<SensitivePattern>> = LazyLock::new(|| {
    let build = |pattern: &str| Regex::new(pattern).ok();
    [
        // api_key=..., "api-key": "...", ORDERDESK-API-KEY: ...
        build(r#"(?i)((?:orderdesk-)?api[_-]?key["']?\s*[:=]\s*["']?)([^\s"',;&}]{4,})"#),
        // master_key / master_secret
        build(r#"(?i)(master[_-]?(?:key|secret)["']?\s*[:=]\s*["']?)([^\s"',;&}]{4,})"#),
        // kms_key
        build(r#"(?i)(kms[_-]?key["']?\s*[:=]\s*["']?)([^\s"',;&}]{4,})"#),
        // password / secret / token
        build(r#"(?i)((?:password|passwd|secret|token)["']?\s*[:=]\s*["']?)([^\s"',;&}]{4,})"#),
        // Bearer tokens
        build(r"(?i)(bearer\s+)([a-zA-Z0-9._~+/=-]{8,})"),
    ]
    .into_iter()
    .flatten()
    .map(|regex| SensitivePattern { regex })
    .collect()
});

struct SensitivePattern {
    regex: Regex,
}

/// Masks sensitive data in strings and JSON values.
#[derive(Debug, Clone)]
pub struct SensitiveDataMasker {
    /// Values shorter than this are masked completely.
    min_length: usize,
    /// Characters kept at the start of a masked value.
    show_start: usize,
    /// Characters kept at the end of a masked value.
    show_end: usize,
}

impl Default for SensitiveDataMasker {
    fn default() -> Self {
        Self::new()
    }
}

impl SensitiveDataMasker {
    /// Creates a masker that never reveals any characters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_length: usize::MAX,
            show_start: 0,
            show_end: 0,
        }
    }

    /// Creates a masker that keeps a short prefix and suffix of long values.
    #[must_use]
    pub fn with_settings(min_length: usize, show_start: usize, show_end: usize) -> Self {
        Self {
            min_length,
            show_start,
            show_end,
        }
    }

    /// Masks a known sensitive value.
    ///
    /// # Example
    ///
    /// ```
    /// use deskgate_telemetry::masking::SensitiveDataMasker;
    ///
    /// let masker = SensitiveDataMasker::with_settings(8, 3, 3);
    /// assert_eq!(masker.mask_value("abcdefghijkl"), "abc***jkl");
    /// assert_eq!(masker.mask_value("short"), "***");
    /// ```
    #[must_use]
    pub fn mask_value(&self, value: &str) -> String {
        let chars: Vec<char> = value.chars().collect();
        if chars.len() < self.min_length || chars.len() <= self.show_start + self.show_end {
            return "***".to_string();
        }
        let start: String = chars[..self.show_start].iter().collect();
        let end: String = chars[chars.len() - self.show_end..].iter().collect();
        format!("{start}***{end}")
    }

    /// Masks every sensitive assignment detected in `input`.
    ///
    /// # Example
    ///
    /// ```
    /// use deskgate_telemetry::masking::SensitiveDataMasker;
    ///
    /// let masker = SensitiveDataMasker::new();
    /// let masked = masker.mask_string(r#"{"api_key": "live-abcdef123456"}"#);
    /// assert!(!masked.contains("live-abcdef123456"));
    /// ```
    #[must_use]
    pub fn mask_string<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut result = Cow::Borrowed(input);
        for pattern in PATTERNS.iter() {
            if pattern.regex.is_match(&result) {
                let replaced = pattern
                    .regex
                    .replace_all(&result, |caps: &Captures<'_>| {
                        format!("{}{}", &caps[1], self.mask_value(&caps[2]))
                    })
                    .into_owned();
                result = Cow::Owned(replaced);
            }
        }
        result
    }

    /// Returns a copy of `value` with sensitive keys redacted at any depth.
    #[must_use]
    pub fn mask_json(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, inner)| {
                        let masked = if is_sensitive_key(key) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.mask_json(inner)
                        };
                        (key.clone(), masked)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.mask_json(v)).collect()),
            Value::String(s) => Value::String(self.mask_string(s).into_owned()),
            other => other.clone(),
        }
    }

    /// Checks whether `input` contains a sensitive assignment.
    #[must_use]
    pub fn contains_sensitive(&self, input: &str) -> bool {
        PATTERNS.iter().any(|p| p.regex.is_match(input))
    }
}

/// Returns true if a field or header name always carries secret material.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    REDACTED_KEYS.contains(&lowered.as_str())
}

/// A wrapper that hides its value in `Display` and `Debug`.
#[derive(Clone)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    /// Wraps a value as sensitive.
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Returns the inner value.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> std::fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> std::fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}
