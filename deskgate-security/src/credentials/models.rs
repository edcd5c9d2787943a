//! Persisted tenant and store records.

use chrono::{DateTime, Utc};
use deskgate_core::types::{StoreRecordId, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A tenant identity.
///
/// Holds only the Argon2id hash of the master secret; the secret itself
/// and the derived key are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Tenant identifier.
    pub id: TenantId,
    /// Master secret hash in PHC format.
    pub secret_hash: String,
    /// Salt for tenant key derivation.
    #[serde(with = "hex_serde")]
    pub salt: Vec<u8>,
    /// Optional contact address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Last successful authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl TenantRecord {
    /// Creates a new record stamped with the current time.
    #[must_use]
    pub fn new(secret_hash: String, salt: Vec<u8>, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TenantId::generate(),
            secret_hash,
            salt,
            email,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }
}

/// An upstream store registered by a tenant, with its encrypted API key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecord {
    /// Local record identifier.
    pub id: StoreRecordId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Upstream store identifier.
    pub store_id: String,
    /// Friendly name, unique per tenant.
    pub name: String,
    /// Free-form label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Encrypted API key.
    #[serde(with = "base64_serde")]
    pub api_key_ciphertext: Vec<u8>,
    /// GCM tag of the encrypted API key.
    #[serde(with = "base64_serde")]
    pub api_key_tag: Vec<u8>,
    /// GCM nonce of the encrypted API key.
    #[serde(with = "base64_serde")]
    pub api_key_nonce: Vec<u8>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl StoreRecord {
    /// Returns true if `identifier` names this store by upstream ID or,
    /// case-insensitively, by friendly name.
    #[must_use]
    pub fn matches(&self, identifier: &str) -> bool {
        self.store_id == identifier || self.name.eq_ignore_ascii_case(identifier)
    }

    /// Returns the view of this record that is safe to show callers.
    #[must_use]
    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            store_id: self.store_id.clone(),
            name: self.name.clone(),
            label: self.label.clone(),
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for StoreRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRecord")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("store_id", &self.store_id)
            .field("name", &self.name)
            .field("label", &self.label)
            .field("api_key", &"[ENCRYPTED]")
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Store listing entry without credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSummary {
    /// Upstream store identifier.
    pub store_id: String,
    /// Friendly name.
    pub name: String,
    /// Free-form label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

mod base64_serde {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BASE64_STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
