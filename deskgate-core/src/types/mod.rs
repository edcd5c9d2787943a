//! Identifier and resource types.
//!
//! - [`TenantId`] - opaque tenant identifier
//! - [`StoreRecordId`] - local identifier of a registered store
//! - [`ResourceKind`] - upstream resource families reachable through the gateway
//! - [`ListQuery`] and [`Page`] - pagination of list calls

mod ids;
mod page;
mod resource;

pub use ids::{StoreRecordId, TenantId};
pub use page::{DEFAULT_PAGE_LIMIT, ListQuery, MAX_PAGE_LIMIT, Page};
pub use resource::ResourceKind;
