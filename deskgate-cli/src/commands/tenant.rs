//! Tenant lifecycle commands.

use anyhow::{Result, bail};
use clap::Parser;
use serde_json::json;
use tracing::info;

use super::{Context, print_json};

/// Arguments for tenant create command
#[derive(Parser)]
pub struct CreateArgs {
    /// Contact email
    #[arg(long)]
    pub email: Option<String>,
}

/// Arguments for tenant delete command
#[derive(Parser)]
pub struct DeleteArgs {
    /// Confirm deletion of the tenant and every store it owns
    #[arg(long)]
    pub yes: bool,
}

/// Create a tenant.
///
/// Without a master secret a new one is generated and printed once.
pub async fn create(ctx: &Context, args: CreateArgs) -> Result<()> {
    let workspace = ctx.open().await?;
    let (secret, generated) = match ctx.optional_master_secret() {
        Some(secret) => (secret, false),
        None => (workspace.gateway.generate_master_secret()?, true),
    };

    let session = workspace.gateway.signup(&secret, args.email, None).await?;
    info!(tenant_id = %session.tenant_id(), "Tenant created");

    println!("Tenant created: {}", session.tenant_id());
    if generated {
        if let Some(value) = secret.expose_str() {
            println!("Master secret (shown once, keep it safe): {value}");
        }
    }
    Ok(())
}

/// Check a master secret and show the tenant.
pub async fn verify(ctx: &Context) -> Result<()> {
    let workspace = ctx.open().await?;
    let tenant = workspace.gateway.tenants().authenticate(&ctx.master_secret()?).await?;
    print_json(&json!({
        "tenant_id": tenant.id,
        "email": tenant.email,
        "created_at": tenant.created_at,
        "last_login_at": tenant.last_login_at,
    }))
}

/// Delete the tenant and all of its stores.
pub async fn delete(ctx: &Context, args: DeleteArgs) -> Result<()> {
    if !args.yes {
        bail!("Refusing to delete the tenant and all of its stores without --yes");
    }
    let (workspace, session) = ctx.session().await?;
    let tenant_id = session.tenant_id();

    let deleted = workspace.gateway.delete_tenant(session).await?;

    if deleted {
        println!("Tenant {tenant_id} deleted");
    } else {
        println!("Tenant {tenant_id} was already gone");
    }
    Ok(())
}
