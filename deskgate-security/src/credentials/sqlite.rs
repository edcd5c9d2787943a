//! SQLite-backed credential repository.
//!
//! Uniqueness and cascades are enforced by the schema, so several processes
//! can share one database file without losing each other's writes.

use super::models::{StoreRecord, TenantRecord};
use super::repository::CredentialRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskgate_core::error::{GatewayError, Result};
use deskgate_core::types::TenantId;
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tenants (
    id            TEXT PRIMARY KEY,
    secret_hash   TEXT NOT NULL,
    salt          BLOB NOT NULL,
    email         TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    last_login_at TEXT
);

CREATE TABLE IF NOT EXISTS stores (
    seq                INTEGER PRIMARY KEY AUTOINCREMENT,
    id                 TEXT NOT NULL UNIQUE,
    tenant_id          TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    store_id           TEXT NOT NULL,
    name               TEXT NOT NULL,
    label              TEXT,
    api_key_ciphertext BLOB NOT NULL,
    api_key_tag        BLOB NOT NULL,
    api_key_nonce      BLOB NOT NULL,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_stores_tenant_store_id
    ON stores(tenant_id, store_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_stores_tenant_name
    ON stores(tenant_id, name COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS active_stores (
    tenant_id  TEXT PRIMARY KEY REFERENCES tenants(id) ON DELETE CASCADE,
    store_id   TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

const STORE_COLUMNS: &str = "id, tenant_id, store_id, name, label, api_key_ciphertext, \
     api_key_tag, api_key_nonce, created_at, updated_at";

const TENANT_COLUMNS: &str = "id, secret_hash, salt, email, created_at, updated_at, last_login_at";

/// Credential repository stored in a SQLite database.
///
/// Calls run on the blocking thread pool; the connection is shared behind a
/// mutex. Other processes opening the same file wait up to five seconds for
/// the write lock.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Opens or creates the database at `path` and applies the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GatewayError::storage(format!("Failed to create directory: {e}")))?;
        }

        let display_path = path.display().to_string();
        let repo = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(storage("open database"))?;
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
                .map_err(storage("enable WAL"))?;
            Self::init(conn)
        })
        .await
        .map_err(|e| GatewayError::storage(format!("Database task failed: {e}")))??;

        info!(path = %display_path, "Opened credential database");
        Ok(repo)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage("open database"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(storage("set busy timeout"))?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(storage("enable foreign keys"))?;
        conn.execute_batch(SCHEMA).map_err(storage("apply schema"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || op(&mut conn.lock()))
            .await
            .map_err(|e| GatewayError::storage(format!("Database task failed: {e}")))?
    }

    /// Returns the number of tenants.
    pub async fn tenant_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM tenants").await
    }

    /// Returns the number of stores across all tenants.
    pub async fn store_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM stores").await
    }

    async fn count(&self, sql: &'static str) -> Result<usize> {
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0)).map_err(storage("count rows"))?;
            Ok(usize::try_from(n).unwrap_or(0))
        })
        .await
    }

    /// Returns the tenant's remembered store selection.
    pub async fn active_store(&self, tenant_id: TenantId) -> Result<Option<String>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT store_id FROM active_stores WHERE tenant_id = ?1",
                params![tenant_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage("read store selection"))
        })
        .await
    }

    /// Remembers or, with `None`, clears the tenant's store selection.
    pub async fn set_active_store(&self, tenant_id: TenantId, store_id: Option<String>) -> Result<()> {
        self.with_conn(move |conn| {
            let tenant = tenant_id.to_string();
            let written = match store_id {
                Some(store_id) => conn.execute(
                    "INSERT INTO active_stores (tenant_id, store_id, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(tenant_id) DO UPDATE SET store_id = excluded.store_id,
                                                          updated_at = excluded.updated_at",
                    params![tenant, store_id, Utc::now().to_rfc3339()],
                ),
                None => conn.execute("DELETE FROM active_stores WHERE tenant_id = ?1", params![tenant]),
            };
            written.map_err(|e| match constraint_kind(&e) {
                Some(ConstraintKind::ForeignKey) => GatewayError::not_found("Tenant", tenant_id.to_string()),
                _ => storage("write store selection")(e),
            })?;
            Ok(())
        })
        .await
    }

    fn query_store(conn: &Connection, sql: &str, tenant_id: TenantId, key: &str) -> Result<Option<StoreRecord>> {
        conn.query_row(sql, params![tenant_id.to_string(), key], row_to_store)
            .optional()
            .map_err(storage("read store"))
    }
}

#[async_trait]
impl CredentialRepository for SqliteRepository {
    async fn insert_tenant(&self, tenant: TenantRecord) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tenants (id, secret_hash, salt, email, created_at, updated_at, last_login_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    tenant.id.to_string(),
                    tenant.secret_hash,
                    tenant.salt,
                    tenant.email,
                    tenant.created_at.to_rfc3339(),
                    tenant.updated_at.to_rfc3339(),
                    tenant.last_login_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| match constraint_kind(&e) {
                Some(ConstraintKind::Unique) => GatewayError::duplicate("tenant_id", "Tenant already exists"),
                _ => storage("insert tenant")(e),
            })?;
            debug!(tenant_id = %tenant.id, "Tenant row inserted");
            Ok(())
        })
        .await
    }

    async fn update_tenant(&self, tenant: TenantRecord) -> Result<()> {
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE tenants SET secret_hash = ?2, salt = ?3, email = ?4, updated_at = ?5,
                                        last_login_at = ?6
                     WHERE id = ?1",
                    params![
                        tenant.id.to_string(),
                        tenant.secret_hash,
                        tenant.salt,
                        tenant.email,
                        tenant.updated_at.to_rfc3339(),
                        tenant.last_login_at.map(|t| t.to_rfc3339()),
                    ],
                )
                .map_err(storage("update tenant"))?;
            if changed == 0 {
                return Err(GatewayError::not_found("Tenant", tenant.id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Option<TenantRecord>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1"),
                params![id.to_string()],
                row_to_tenant,
            )
            .optional()
            .map_err(storage("read tenant"))
        })
        .await
    }

    async fn list_tenants(&self) -> Result<Vec<TenantRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at, rowid"))
                .map_err(storage("list tenants"))?;
            let rows = stmt.query_map([], row_to_tenant).map_err(storage("list tenants"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage("list tenants"))
        })
        .await
    }

    async fn delete_tenant(&self, id: TenantId) -> Result<bool> {
        self.with_conn(move |conn| {
            let deleted = conn
                .execute("DELETE FROM tenants WHERE id = ?1", params![id.to_string()])
                .map_err(storage("delete tenant"))?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn insert_store(&self, store: StoreRecord) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(storage("begin transaction"))?;
            let tenant = store.tenant_id.to_string();

            let id_taken: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM stores WHERE tenant_id = ?1 AND store_id = ?2)",
                    params![tenant, store.store_id],
                    |row| row.get(0),
                )
                .map_err(storage("check store id"))?;
            if id_taken {
                return Err(duplicate_store_id(&store.store_id));
            }

            tx.execute(
                &format!(
                    "INSERT INTO stores ({STORE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    store.id.to_string(),
                    tenant,
                    store.store_id,
                    store.name,
                    store.label,
                    store.api_key_ciphertext,
                    store.api_key_tag,
                    store.api_key_nonce,
                    store.created_at.to_rfc3339(),
                    store.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| match constraint_kind(&e) {
                Some(ConstraintKind::Unique) if e.to_string().contains("stores.store_id") => {
                    duplicate_store_id(&store.store_id)
                }
                Some(ConstraintKind::Unique) => GatewayError::duplicate(
                    "name",
                    format!("Store name '{}' is already in use", store.name),
                ),
                Some(ConstraintKind::ForeignKey) => GatewayError::not_found("Tenant", tenant.clone()),
                None => storage("insert store")(e),
            })?;

            tx.commit().map_err(storage("commit store"))?;
            Ok(())
        })
        .await
    }

    async fn list_stores(&self, tenant_id: TenantId) -> Result<Vec<StoreRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {STORE_COLUMNS} FROM stores WHERE tenant_id = ?1 ORDER BY seq DESC"
                ))
                .map_err(storage("list stores"))?;
            let rows = stmt
                .query_map(params![tenant_id.to_string()], row_to_store)
                .map_err(storage("list stores"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage("list stores"))
        })
        .await
    }

    async fn delete_store(&self, tenant_id: TenantId, store_id: &str) -> Result<bool> {
        let store_id = store_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(storage("begin transaction"))?;
            let tenant = tenant_id.to_string();
            let deleted = tx
                .execute(
                    "DELETE FROM stores WHERE tenant_id = ?1 AND store_id = ?2",
                    params![tenant, store_id],
                )
                .map_err(storage("delete store"))?;
            tx.execute(
                "DELETE FROM active_stores WHERE tenant_id = ?1 AND store_id = ?2",
                params![tenant, store_id],
            )
            .map_err(storage("clear store selection"))?;
            tx.commit().map_err(storage("commit store deletion"))?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn find_store_by_id(&self, tenant_id: TenantId, store_id: &str) -> Result<Option<StoreRecord>> {
        let store_id = store_id.to_string();
        self.with_conn(move |conn| {
            Self::query_store(
                conn,
                &format!("SELECT {STORE_COLUMNS} FROM stores WHERE tenant_id = ?1 AND store_id = ?2"),
                tenant_id,
                &store_id,
            )
        })
        .await
    }

    async fn find_store_by_name(&self, tenant_id: TenantId, name: &str) -> Result<Option<StoreRecord>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            Self::query_store(
                conn,
                &format!(
                    "SELECT {STORE_COLUMNS} FROM stores
                     WHERE tenant_id = ?1 AND name = ?2 COLLATE NOCASE"
                ),
                tenant_id,
                &name,
            )
        })
        .await
    }
}

enum ConstraintKind {
    Unique,
    ForeignKey,
}

fn constraint_kind(error: &rusqlite::Error) -> Option<ConstraintKind> {
    match error {
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation => {
            match failure.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(ConstraintKind::ForeignKey),
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    Some(ConstraintKind::Unique)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn duplicate_store_id(store_id: &str) -> GatewayError {
    GatewayError::duplicate("store_id", format!("Store '{store_id}' is already registered"))
}

fn storage(action: &'static str) -> impl Fn(rusqlite::Error) -> GatewayError {
    move |e| GatewayError::storage(format!("Failed to {action}: {e}"))
}

fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_time(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_column::<DateTime<chrono::FixedOffset>>(row, idx).map(|t| t.with_timezone(&Utc))
}

fn parse_optional_time(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => parse_time(row, idx).map(Some),
        None => Ok(None),
    }
}

fn row_to_tenant(row: &rusqlite::Row<'_>) -> rusqlite::Result<TenantRecord> {
    Ok(TenantRecord {
        id: parse_column(row, 0)?,
        secret_hash: row.get(1)?,
        salt: row.get(2)?,
        email: row.get(3)?,
        created_at: parse_time(row, 4)?,
        updated_at: parse_time(row, 5)?,
        last_login_at: parse_optional_time(row, 6)?,
    })
}

fn row_to_store(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreRecord> {
    Ok(StoreRecord {
        id: parse_column(row, 0)?,
        tenant_id: parse_column(row, 1)?,
        store_id: row.get(2)?,
        name: row.get(3)?,
        label: row.get(4)?,
        api_key_ciphertext: row.get(5)?,
        api_key_tag: row.get(6)?,
        api_key_nonce: row.get(7)?,
        created_at: parse_time(row, 8)?,
        updated_at: parse_time(row, 9)?,
    })
}
