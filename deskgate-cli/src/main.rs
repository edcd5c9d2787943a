//! # Deskgate CLI
//!
//! Command-line interface for the deskgate credential gateway.
//!
//! This CLI provides commands for:
//! - Tenant lifecycle (create, verify, delete)
//! - Store registration and selection
//! - Orders and inventory items on the selected store

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use deskgate_telemetry::logging::{LogConfig, init_logging};

use commands::{Context, order, product, store, tenant};

/// Deskgate - multi-tenant credential gateway for the `OrderDesk` API
#[derive(Parser)]
#[command(name = "deskgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, global = true, env = "DESKGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Tenant master secret
    #[arg(long, global = true, env = "DESKGATE_MASTER_KEY", hide_env_values = true)]
    master_key: Option<String>,

    /// Store ID or name to use instead of the selected store
    #[arg(short, long, global = true)]
    store: Option<String>,

    /// Credential database path (overrides `state_path` from the config)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Tenant management commands
    #[command(subcommand)]
    Tenant(TenantCommands),

    /// Store management commands
    #[command(subcommand)]
    Store(StoreCommands),

    /// Order commands
    #[command(subcommand)]
    Order(OrderCommands),

    /// Inventory item commands
    #[command(subcommand)]
    Product(ProductCommands),

    /// Show effective configuration
    Info,
}

/// Tenant subcommands
#[derive(Subcommand)]
pub enum TenantCommands {
    /// Create a tenant; generates a master secret when none is given
    Create(tenant::CreateArgs),

    /// Check a master secret and show the tenant
    Verify,

    /// Delete the tenant and all of its stores
    Delete(tenant::DeleteArgs),
}

/// Store subcommands
#[derive(Subcommand)]
pub enum StoreCommands {
    /// Register an upstream store
    Register(store::RegisterArgs),

    /// List registered stores
    List,

    /// Remove a store
    Remove(store::IdentifierArgs),

    /// Select the store used when `--store` is omitted
    Use(store::IdentifierArgs),

    /// Test the store's upstream credential
    Test,

    /// Show upstream store settings and folders
    Settings,
}

/// Order subcommands
#[derive(Subcommand)]
pub enum OrderCommands {
    /// Get one order
    Get(order::IdArgs),

    /// List orders
    List(order::ListArgs),

    /// Create an order
    Create(order::CreateArgs),

    /// Update an order with a change-set; `null` removes a field
    Update(order::UpdateArgs),

    /// Apply path operations to an order
    Patch(order::PatchArgs),

    /// Delete an order
    Delete(order::IdArgs),

    /// Move an order to another folder
    Move(order::MoveArgs),

    /// Append line items to an order
    AddItems(order::AddItemsArgs),

    /// Update the shipping, customer or return address
    Address(order::AddressArgs),
}

/// Inventory item subcommands
#[derive(Subcommand)]
pub enum ProductCommands {
    /// Get one inventory item
    Get(product::IdArgs),

    /// List inventory items
    List(product::ListArgs),

    /// Create an inventory item
    Create(product::CreateArgs),

    /// Update an inventory item with a change-set
    Update(product::UpdateArgs),

    /// Delete an inventory item
    Delete(product::IdArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = Context::load(&cli)?;

    let settings = &ctx.config().logging;
    let level = if cli.verbose { "debug" } else { settings.level.as_str() };
    let _guards = init_logging(&LogConfig::from_parts(
        level,
        &settings.format,
        settings.directory.as_deref(),
    ))?;

    match cli.command {
        Commands::Tenant(cmd) => match cmd {
            TenantCommands::Create(args) => tenant::create(&ctx, args).await?,
            TenantCommands::Verify => tenant::verify(&ctx).await?,
            TenantCommands::Delete(args) => tenant::delete(&ctx, args).await?,
        },
        Commands::Store(cmd) => match cmd {
            StoreCommands::Register(args) => store::register(&ctx, args).await?,
            StoreCommands::List => store::list(&ctx).await?,
            StoreCommands::Remove(args) => store::remove(&ctx, args).await?,
            StoreCommands::Use(args) => store::select(&ctx, args).await?,
            StoreCommands::Test => store::test(&ctx).await?,
            StoreCommands::Settings => store::settings(&ctx).await?,
        },
        Commands::Order(cmd) => match cmd {
            OrderCommands::Get(args) => order::get(&ctx, args).await?,
            OrderCommands::List(args) => order::list(&ctx, args).await?,
            OrderCommands::Create(args) => order::create(&ctx, args).await?,
            OrderCommands::Update(args) => order::update(&ctx, args).await?,
            OrderCommands::Patch(args) => order::patch(&ctx, args).await?,
            OrderCommands::Delete(args) => order::delete(&ctx, args).await?,
            OrderCommands::Move(args) => order::move_to_folder(&ctx, args).await?,
            OrderCommands::AddItems(args) => order::add_items(&ctx, args).await?,
            OrderCommands::Address(args) => order::address(&ctx, args).await?,
        },
        Commands::Product(cmd) => match cmd {
            ProductCommands::Get(args) => product::get(&ctx, args).await?,
            ProductCommands::List(args) => product::list(&ctx, args).await?,
            ProductCommands::Create(args) => product::create(&ctx, args).await?,
            ProductCommands::Update(args) => product::update(&ctx, args).await?,
            ProductCommands::Delete(args) => product::delete(&ctx, args).await?,
        },
        Commands::Info => print_info(&ctx),
    }

    Ok(())
}

fn print_info(ctx: &Context) {
    let config = ctx.config();
    println!("Deskgate Credential Gateway");
    println!("===========================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Upstream:       {}", config.http.base_url);
    println!("Max retries:    {}", config.http.max_retries);
    println!("Mutation tries: {}", config.mutation.max_attempts);
    println!("Auto-provision: {}", config.auto_provision_tenant);
    println!("Rate limiting:  {}", if config.rate_limit.enabled { "on" } else { "off" });
    println!("State database: {}", ctx.state_path().display());
}
