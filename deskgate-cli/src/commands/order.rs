//! Order commands.

use anyhow::{Result, bail};
use clap::Parser;
use deskgate_core::types::ResourceKind;
use deskgate_gateway::mutation::{AddressKind, Mutation, PathOperation};
use serde_json::Value;

use super::{Context, JsonInput, resource};

pub use resource::{CreateArgs, IdArgs, ListArgs, UpdateArgs};

/// Arguments for order patch command
#[derive(Parser)]
pub struct PatchArgs {
    /// Order ID
    pub id: String,

    /// JSON array of `{"op": "replace|add|remove", "path": "a.b", "value": ...}`
    #[command(flatten)]
    pub input: JsonInput,
}

/// Arguments for order move command
#[derive(Parser)]
pub struct MoveArgs {
    /// Order ID
    pub id: String,

    /// Destination folder ID
    pub folder_id: u64,
}

/// Arguments for order add-items command
#[derive(Parser)]
pub struct AddItemsArgs {
    /// Order ID
    pub id: String,

    /// One item object or an array of items
    #[command(flatten)]
    pub input: JsonInput,
}

/// Arguments for order address command
#[derive(Parser)]
pub struct AddressArgs {
    /// Order ID
    pub id: String,

    /// Address block: shipping, customer or return_address
    pub kind: AddressKind,

    /// Address fields; `null` removes a field
    #[command(flatten)]
    pub input: JsonInput,
}

/// Get one order.
pub async fn get(ctx: &Context, args: IdArgs) -> Result<()> {
    resource::get(ctx, ResourceKind::Order, args).await
}

/// List orders.
pub async fn list(ctx: &Context, args: ListArgs) -> Result<()> {
    resource::list(ctx, ResourceKind::Order, args).await
}

/// Create an order.
pub async fn create(ctx: &Context, args: CreateArgs) -> Result<()> {
    resource::create(ctx, ResourceKind::Order, args).await
}

/// Update an order with a change-set.
pub async fn update(ctx: &Context, args: UpdateArgs) -> Result<()> {
    resource::update(ctx, ResourceKind::Order, args).await
}

/// Delete an order.
pub async fn delete(ctx: &Context, args: IdArgs) -> Result<()> {
    resource::delete(ctx, ResourceKind::Order, args).await
}

/// Apply path operations to an order.
pub async fn patch(ctx: &Context, args: PatchArgs) -> Result<()> {
    let operations: Vec<PathOperation> = serde_json::from_value(args.input.read()?)?;
    resource::mutate(ctx, ResourceKind::Order, &args.id, Mutation::Operations(operations)).await
}

/// Move an order to another folder.
pub async fn move_to_folder(ctx: &Context, args: MoveArgs) -> Result<()> {
    resource::mutate(ctx, ResourceKind::Order, &args.id, Mutation::MoveToFolder(args.folder_id)).await
}

/// Append line items to an order.
pub async fn add_items(ctx: &Context, args: AddItemsArgs) -> Result<()> {
    let items = match args.input.read()? {
        Value::Array(items) => items,
        item @ Value::Object(_) => vec![item],
        _ => bail!("Items must be a JSON object or an array of objects"),
    };
    resource::mutate(ctx, ResourceKind::Order, &args.id, Mutation::AddItems(items)).await
}

/// Update one address block of an order.
pub async fn address(ctx: &Context, args: AddressArgs) -> Result<()> {
    let address = args.input.read_object()?;
    if address.is_empty() {
        bail!("Address must contain at least one field");
    }
    let mutation = Mutation::UpdateAddress {
        kind: args.kind,
        address,
    };
    resource::mutate(ctx, ResourceKind::Order, &args.id, mutation).await
}
