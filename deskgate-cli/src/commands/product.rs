//! Inventory item commands.

use anyhow::Result;
use deskgate_core::types::ResourceKind;

use super::{Context, resource};

pub use resource::{CreateArgs, IdArgs, ListArgs, UpdateArgs};

/// Get one inventory item.
pub async fn get(ctx: &Context, args: IdArgs) -> Result<()> {
    resource::get(ctx, ResourceKind::InventoryItem, args).await
}

/// List inventory items.
pub async fn list(ctx: &Context, args: ListArgs) -> Result<()> {
    resource::list(ctx, ResourceKind::InventoryItem, args).await
}

/// Create an inventory item.
pub async fn create(ctx: &Context, args: CreateArgs) -> Result<()> {
    resource::create(ctx, ResourceKind::InventoryItem, args).await
}

/// Update an inventory item with a change-set.
pub async fn update(ctx: &Context, args: UpdateArgs) -> Result<()> {
    resource::update(ctx, ResourceKind::InventoryItem, args).await
}

/// Delete an inventory item.
pub async fn delete(ctx: &Context, args: IdArgs) -> Result<()> {
    resource::delete(ctx, ResourceKind::InventoryItem, args).await
}
