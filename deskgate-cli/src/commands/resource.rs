//! Shared handlers for orders and inventory items.

use anyhow::Result;
use clap::Parser;
use deskgate_core::types::{DEFAULT_PAGE_LIMIT, ListQuery, ResourceKind};
use deskgate_gateway::mutation::{Mutation, MutationOutcome};
use tracing::info;

use super::{Context, JsonInput, print_json};

/// Resource ID
#[derive(Parser)]
pub struct IdArgs {
    /// Resource ID
    pub id: String,
}

/// Arguments for list commands
#[derive(Parser)]
pub struct ListArgs {
    /// Page size (1-100)
    #[arg(short, long, default_value_t = DEFAULT_PAGE_LIMIT)]
    pub limit: u32,

    /// Number of records to skip
    #[arg(short, long, default_value_t = 0)]
    pub offset: u32,

    /// Folder ID filter (orders only)
    #[arg(long)]
    pub folder: Option<u64>,

    /// Status filter
    #[arg(long)]
    pub status: Option<String>,

    /// Search term
    #[arg(long)]
    pub search: Option<String>,
}

impl ListArgs {
    fn query(self) -> ListQuery {
        let mut query = ListQuery::new(self.limit, self.offset);
        if let Some(folder) = self.folder {
            query = query.with_folder(folder);
        }
        if let Some(status) = self.status {
            query = query.with_status(status);
        }
        if let Some(search) = self.search {
            query = query.with_search(search);
        }
        query
    }
}

/// Arguments for create commands
#[derive(Parser)]
pub struct CreateArgs {
    /// Resource body
    #[command(flatten)]
    pub input: JsonInput,
}

/// Arguments for update commands
#[derive(Parser)]
pub struct UpdateArgs {
    /// Resource ID
    pub id: String,

    /// Change-set; `null` removes a field
    #[command(flatten)]
    pub input: JsonInput,
}

/// Fetch and print one resource.
pub async fn get(ctx: &Context, kind: ResourceKind, args: IdArgs) -> Result<()> {
    let (workspace, session) = ctx.session().await?;
    let resource = workspace.gateway.get_resource(&session, None, kind, &args.id).await?;
    print_json(&resource)
}

/// Print one page of resources.
pub async fn list(ctx: &Context, kind: ResourceKind, args: ListArgs) -> Result<()> {
    let (workspace, session) = ctx.session().await?;
    let page = workspace
        .gateway
        .list_resources(&session, None, kind, &args.query())
        .await?;
    print_json(&page)
}

/// Create a resource from JSON input.
pub async fn create(ctx: &Context, kind: ResourceKind, args: CreateArgs) -> Result<()> {
    let body = args.input.read()?;
    let (workspace, session) = ctx.session().await?;
    let created = workspace.gateway.create_resource(&session, None, kind, body).await?;
    print_json(&created)
}

/// Apply a change-set through the coordinator.
pub async fn update(ctx: &Context, kind: ResourceKind, args: UpdateArgs) -> Result<()> {
    let changes = args.input.read_object()?;
    mutate(ctx, kind, &args.id, Mutation::Merge(changes)).await
}

/// Delete a resource.
pub async fn delete(ctx: &Context, kind: ResourceKind, args: IdArgs) -> Result<()> {
    let (workspace, session) = ctx.session().await?;
    let response = workspace.gateway.delete_resource(&session, None, kind, &args.id).await?;
    print_json(&response)
}

/// Runs a mutation through the coordinator and prints the stored object.
pub async fn mutate(ctx: &Context, kind: ResourceKind, id: &str, mutation: Mutation) -> Result<()> {
    let (workspace, session) = ctx.session().await?;
    let MutationOutcome { resource, attempts } = workspace
        .gateway
        .mutate(&session, None, kind, id, mutation)
        .await?;
    info!(resource = %kind, id, attempts, "Update applied");
    print_json(&resource)
}
