//! # Deskgate Security
//!
//! Tenant identity and credential protection for the deskgate gateway.
//!
//! This crate provides:
//! - Per-tenant key derivation with HKDF-SHA256 and AES-256-GCM credential encryption
//! - Argon2id master secret hashing
//! - Tenant-scoped store registry with pluggable storage
//! - Token bucket rate limiting per tenant and per source address
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deskgate_security::credentials::{CredentialStore, MemoryRepository, StoreRegistration};
//! use deskgate_security::crypto::{Argon2Params, CryptoEngine};
//! use deskgate_security::secret::Secret;
//! use deskgate_security::tenant::TenantService;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Arc::new(MemoryRepository::new());
//! let crypto = Arc::new(CryptoEngine::new(&[0u8; 32], Argon2Params::default())?);
//! let tenants = TenantService::new(repo.clone(), crypto.clone(), true);
//! let stores = CredentialStore::new(repo, crypto);
//!
//! let mut session = tenants.open_session(&Secret::from("my-long-master-secret")).await?;
//! stores
//!     .register_store(&session, StoreRegistration::new("12345", "od-api-key").with_name("Main"))
//!     .await?;
//! stores.use_store(&mut session, "main").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

/// Tenant and store records, storage, and the store registry.
pub mod credentials;

/// Key derivation, encryption and hashing.
pub mod crypto;

/// Token bucket rate limiting.
pub mod rate_limit;

/// Redacted secret values.
pub mod secret;

/// Authenticated session state.
pub mod session;

/// Tenant authentication and lifecycle.
pub mod tenant;

/// Re-exports of commonly used types.
pub mod prelude {
    pub use crate::credentials::{
        CredentialRepository, CredentialStore, MemoryRepository, SqliteRepository, StoreCredential,
        StoreRecord, StoreRegistration, StoreSummary, TenantRecord,
    };
    pub use crate::crypto::{Argon2Params, CryptoEngine, EncryptedCredential, HashedSecret, TenantKey};
    pub use crate::rate_limit::{Admission, BucketFamily, OperationClass, RateLimiter, Subject};
    pub use crate::secret::Secret;
    pub use crate::session::SessionContext;
    pub use crate::tenant::TenantService;
}
