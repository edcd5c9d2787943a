//! Store registration and selection commands.

use anyhow::{Result, bail};
use clap::Parser;
use deskgate_security::credentials::StoreRegistration;

use super::{Context, print_json};

/// Arguments for store register command
#[derive(Parser)]
pub struct RegisterArgs {
    /// Upstream store ID
    pub store_id: String,

    /// Upstream API key
    #[arg(long, env = "DESKGATE_STORE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Friendly name, unique per tenant (defaults to the store ID)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Free-form label
    #[arg(short, long)]
    pub label: Option<String>,

    /// Select the store after registering it
    #[arg(long)]
    pub select: bool,
}

/// Store ID or friendly name
#[derive(Parser)]
pub struct IdentifierArgs {
    /// Store ID or friendly name
    pub identifier: String,
}

/// Register an upstream store.
pub async fn register(ctx: &Context, args: RegisterArgs) -> Result<()> {
    let (workspace, mut session) = ctx.session().await?;

    let mut registration = StoreRegistration::new(args.store_id, args.api_key);
    if let Some(name) = args.name {
        registration = registration.with_name(name);
    }
    if let Some(label) = args.label {
        registration = registration.with_label(label);
    }

    let summary = workspace.gateway.register_store(&session, registration).await?;
    if args.select {
        workspace.gateway.use_store(&mut session, &summary.store_id).await?;
        workspace.remember_store(&session).await?;
    }
    print_json(&summary)
}

/// List registered stores.
pub async fn list(ctx: &Context) -> Result<()> {
    let (workspace, session) = ctx.session().await?;
    let stores = workspace.gateway.list_stores(&session).await?;

    if stores.is_empty() {
        println!("No stores registered");
        return Ok(());
    }
    for store in &stores {
        let marker = if session.active_store() == Some(store.store_id.as_str()) { "*" } else { " " };
        let label = store.label.as_deref().unwrap_or("");
        println!("{marker} {:<12} {:<24} {label}", store.store_id, store.name);
    }
    Ok(())
}

/// Remove a store.
pub async fn remove(ctx: &Context, args: IdentifierArgs) -> Result<()> {
    let (workspace, mut session) = ctx.session().await?;
    let deleted = workspace.gateway.delete_store(&mut session, &args.identifier).await?;
    workspace.remember_store(&session).await?;

    if deleted {
        println!("Store '{}' removed", args.identifier);
    } else {
        println!("No store matched '{}'", args.identifier);
    }
    Ok(())
}

/// Select the store used when `--store` is omitted.
pub async fn select(ctx: &Context, args: IdentifierArgs) -> Result<()> {
    let (workspace, mut session) = ctx.session().await?;
    let summary = workspace.gateway.use_store(&mut session, &args.identifier).await?;
    workspace.remember_store(&session).await?;
    println!("Using store {} ({})", summary.store_id, summary.name);
    Ok(())
}

/// Test the store's upstream credential.
pub async fn test(ctx: &Context) -> Result<()> {
    let (workspace, session) = ctx.session().await?;
    let status = workspace.gateway.test_store(&session, ctx.store_override()).await?;
    print_json(&status)?;
    if !status.connected {
        bail!("Connection test failed for store {}", status.store_id);
    }
    Ok(())
}

/// Show upstream store settings.
pub async fn settings(ctx: &Context) -> Result<()> {
    let (workspace, session) = ctx.session().await?;
    let settings = workspace.gateway.store_settings(&session, ctx.store_override()).await?;
    print_json(&settings)
}
