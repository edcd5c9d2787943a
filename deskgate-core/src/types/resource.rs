//! Upstream resource families.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A resource family exposed by the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Customer orders.
    Order,
    /// Products tracked as inventory items.
    InventoryItem,
}

impl ResourceKind {
    /// Returns the collection path under the API root.
    #[must_use]
    pub const fn collection_path(&self) -> &'static str {
        match self {
            Self::Order => "/orders",
            Self::InventoryItem => "/inventory-items",
        }
    }

    /// Returns the key the upstream wraps list responses in.
    #[must_use]
    pub const fn list_key(&self) -> &'static str {
        match self {
            Self::Order => "orders",
            Self::InventoryItem => "inventory_items",
        }
    }

    /// Returns the key the upstream wraps single-item responses in.
    #[must_use]
    pub const fn item_key(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::InventoryItem => "inventory_item",
        }
    }

    /// Returns the path of one resource.
    #[must_use]
    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{id}", self.collection_path())
    }

    /// Returns the human-readable resource name used in errors.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Order => "Order",
            Self::InventoryItem => "Product",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
