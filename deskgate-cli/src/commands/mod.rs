//! Command implementations and shared state handling.
//!
//! Each invocation opens the credential database, opens a session with the
//! master secret and runs one command. Writes go straight to the database,
//! so concurrent invocations never overwrite each other.

pub mod order;
pub mod product;
mod resource;
pub mod store;
pub mod tenant;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use deskgate_core::config::{ConfigLoader, GatewayConfig};
use deskgate_gateway::service::GatewayService;
use deskgate_security::credentials::SqliteRepository;
use deskgate_security::secret::Secret;
use deskgate_security::session::SessionContext;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::Cli;

const DEFAULT_STATE_PATH: &str = ".deskgate/deskgate.db";

/// Settings resolved from flags, environment and the config file.
pub struct Context {
    config: GatewayConfig,
    state_path: PathBuf,
    master_key: Option<String>,
    store: Option<String>,
}

impl Context {
    /// Loads configuration and applies `DESKGATE_*` overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let loader = ConfigLoader::new().with_env_prefix("DESKGATE");
        let config: GatewayConfig = match &cli.config {
            Some(path) => loader
                .load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => loader.load_defaults().context("Invalid configuration")?,
        };

        let state_path = cli
            .state
            .clone()
            .or_else(|| config.state_path.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH));

        Ok(Self {
            config,
            state_path,
            master_key: cli.master_key.clone(),
            store: cli.store.clone(),
        })
    }

    /// Gets the effective configuration.
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Gets the credential database path.
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Gets the `--store` override.
    pub fn store_override(&self) -> Option<&str> {
        self.store.as_deref()
    }

    /// Returns the master secret or explains how to pass one.
    pub fn master_secret(&self) -> Result<Secret> {
        match self.master_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(Secret::from(key)),
            _ => bail!("A master secret is required: pass --master-key or set DESKGATE_MASTER_KEY"),
        }
    }

    /// Returns the master secret if one was given.
    pub fn optional_master_secret(&self) -> Option<Secret> {
        self.master_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(Secret::from)
    }

    /// Opens the credential database and builds the gateway.
    pub async fn open(&self) -> Result<Workspace> {
        let repo = SqliteRepository::open(&self.state_path)
            .await
            .with_context(|| format!("Failed to open state database {}", self.state_path.display()))?;
        let gateway = GatewayService::new(&self.config, Arc::new(repo.clone()))
            .context("Failed to initialize gateway (is DESKGATE_KMS_KEY set?)")?;
        debug!(state = %self.state_path.display(), "State opened");

        Ok(Workspace { gateway, repo })
    }

    /// Opens the workspace and a session, selecting `--store` or the saved store.
    pub async fn session(&self) -> Result<(Workspace, SessionContext)> {
        let workspace = self.open().await?;
        let mut session = workspace.gateway.login(&self.master_secret()?, None).await?;

        let selected = self
            .store
            .clone()
            .or(workspace.repo.active_store(session.tenant_id()).await?);
        if let Some(identifier) = selected {
            if let Err(e) = workspace.gateway.use_store(&mut session, &identifier).await {
                if self.store.is_some() || !e.is_not_found() {
                    return Err(e.into());
                }
                warn!(store = %identifier, "Saved store selection no longer exists");
            }
        }
        Ok((workspace, session))
    }
}

/// The credential database with the gateway built on top of it.
pub struct Workspace {
    /// The gateway.
    pub gateway: GatewayService,
    repo: SqliteRepository,
}

impl Workspace {
    /// Remembers the session's store selection for later invocations.
    pub async fn remember_store(&self, session: &SessionContext) -> Result<()> {
        self.repo
            .set_active_store(session.tenant_id(), session.active_store().map(str::to_string))
            .await
            .context("Failed to save store selection")
    }
}

/// JSON passed inline or read from a file.
#[derive(Args)]
pub struct JsonInput {
    /// Inline JSON
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,

    /// Read JSON from a file (`-` for stdin)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl JsonInput {
    /// Parses the provided JSON.
    pub fn read(&self) -> Result<Value> {
        let content = match (&self.data, &self.file) {
            (Some(data), _) => data.clone(),
            (None, Some(path)) if path.as_os_str() == "-" => {
                std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
            }
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            (None, None) => bail!("Provide JSON with --data or --file"),
        };
        serde_json::from_str(&content).context("Input is not valid JSON")
    }

    /// Parses the provided JSON as an object.
    pub fn read_object(&self) -> Result<Map<String, Value>> {
        match self.read()? {
            Value::Object(map) => Ok(map),
            _ => bail!("Input must be a JSON object"),
        }
    }
}

/// Prints a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
