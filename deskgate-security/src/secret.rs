//! Secret values with redacted formatting and zeroing on drop.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret value such as a master secret or a decrypted upstream API key.
///
/// The bytes are zeroed when the value is dropped and never appear in
/// `Debug` or `Display` output.
///
/// # Example
///
/// ```
/// use deskgate_security::secret::Secret;
///
/// let secret = Secret::from("od-api-key-123");
/// assert_eq!(secret.expose_str(), Some("od-api-key-123"));
/// assert_eq!(format!("{secret:?}"), "Secret([REDACTED, 14 bytes])");
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    data: Vec<u8>,
}

impl Secret {
    /// Creates a new secret from raw bytes.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Exposes the secret bytes.
    ///
    /// The returned slice must not be stored or logged.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.data
    }

    /// Exposes the secret as a string, if valid UTF-8.
    #[must_use]
    pub fn expose_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Returns the length of the secret.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the secret is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(u8::is_ascii_whitespace)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED, {} bytes])", self.data.len())
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.data, &other.data)
    }
}

impl Eq for Secret {}

/// Compares two byte slices without an early exit on the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
