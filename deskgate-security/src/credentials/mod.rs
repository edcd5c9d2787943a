//! Tenant and store records, their storage, and the store registry.

mod memory;
mod models;
mod repository;
mod sqlite;
mod store;

pub use memory::MemoryRepository;
pub use models::{StoreRecord, StoreSummary, TenantRecord};
pub use repository::CredentialRepository;
pub use sqlite::SqliteRepository;
pub use store::{CredentialStore, StoreCredential, StoreRegistration};
