//! PostgreSQL adapter.
//!
//! Connections are resolved through the [`ConnectionCatalog`] and leased per
//! operation from pools cached in a [`PoolRegistry`]. Result rows are
//! aggregated server-side with `json_agg` so every query returns one JSON
//! array regardless of column types.

pub mod catalog;
pub mod pool;
pub mod sql;


use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::{PoolSettings, PostgresConfig};
use crate::error::{ToolError, ToolResult};

pub use catalog::{ConnectionCatalog, ConnectionInfo, Persistence, ResolvedConnection};
pub use pool::{EvictionPolicy, PoolRegistry, policy_from_settings};

/// Operations the database tools need.
///
/// `connection` is a catalog name or a raw URL; `None` means the default.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SqlBackend: Send + Sync {
    fn list_connections(&self) -> Vec<ConnectionInfo>;

    fn add_connection(
        &self,
        name: &str,
        connection_string: &str,
        make_default: bool,
    ) -> ToolResult<ConnectionInfo>;

    fn remove_connection(&self, name: &str) -> ToolResult<()>;

    fn persistence(&self) -> Persistence;

    /// Runs a row-returning statement with text binds; returns a JSON array.
    async fn query_json(
        &self,
        connection: Option<String>,
        sql: String,
        binds: Vec<String>,
    ) -> ToolResult<Value>;

    /// Runs statements in order inside one transaction.
    async fn execute(&self, connection: Option<String>, statements: Vec<String>)
    -> ToolResult<()>;

    /// Inserts JSON objects into an already-quoted table name.
    async fn insert_rows(
        &self,
        connection: Option<String>,
        table: String,
        rows: Vec<Value>,
        truncate: bool,
    ) -> ToolResult<u64>;
}

/// Maps driver errors onto the tool error taxonomy.
pub fn map_sqlx_error(err: sqlx::Error) -> ToolError {
    match err {
        sqlx::Error::RowNotFound => ToolError::not_found("query returned no rows"),
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            match code.as_str() {
                c if c.starts_with("28") => {
                    warn!(sqlstate = c, "database rejected credentials");
                    ToolError::Authentication
                }
                "42P01" | "42703" => ToolError::not_found(db.message().to_string()),
                "" => ToolError::remote(None, db.message().to_string()),
                c => ToolError::remote(None, format!("{} (SQLSTATE {c})", db.message())),
            }
        }
        sqlx::Error::PoolTimedOut => {
            ToolError::remote(None, "timed out waiting for a database connection")
        }
        sqlx::Error::Configuration(e) => {
            ToolError::validation(format!("invalid connection string: {e}"))
        }
        other => ToolError::remote(None, other.to_string()),
    }
}

fn build_pool(url: &str, settings: &PoolSettings) -> Result<PgPool, sqlx::Error> {
    let mut options = PgConnectOptions::from_str(url)?;
    if let Some(timeout) = settings.statement_timeout {
        options = options.options([("statement_timeout", timeout.as_millis().to_string())]);
    }
    Ok(PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect_lazy_with(options))
}

/// `sqlx`-backed implementation of [`SqlBackend`].
pub struct PostgresAdapter {
    catalog: ConnectionCatalog,
    pools: PoolRegistry<PgPool>,
    settings: PoolSettings,
    /// Label of the connection used by the most recent operation.
    active: Mutex<Option<String>>,
}

impl PostgresAdapter {
    pub fn new(config: PostgresConfig) -> Self {
        Self {
            catalog: ConnectionCatalog::new(config.connections, config.default_connection),
            pools: PoolRegistry::new(policy_from_settings(&config.pool)),
            settings: config.pool,
            active: Mutex::new(None),
        }
    }

    /// Returns the shared pool for `connection`, creating it lazily.
    ///
    /// No connection is opened here; one is leased when a statement runs.
    pub fn connect(&self, connection: Option<&str>) -> ToolResult<Arc<PgPool>> {
        let resolved = self.catalog.resolve(connection)?;
        let pool = self
            .pools
            .get_or_try_insert(&resolved.url, |url| build_pool(url, &self.settings))
            .map_err(map_sqlx_error)?;
        debug!(connection = %resolved.label, "using connection");
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(resolved.label);
        Ok(pool)
    }

    pub fn cached_pools(&self) -> usize {
        self.pools.len()
    }
}

#[async_trait]
impl SqlBackend for PostgresAdapter {
    fn list_connections(&self) -> Vec<ConnectionInfo> {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.catalog.list(active.as_deref())
    }

    fn add_connection(
        &self,
        name: &str,
        connection_string: &str,
        make_default: bool,
    ) -> ToolResult<ConnectionInfo> {
        PgConnectOptions::from_str(connection_string.trim()).map_err(map_sqlx_error)?;
        self.catalog.add(name, connection_string, make_default)
    }

    fn remove_connection(&self, name: &str) -> ToolResult<()> {
        let url = self.catalog.remove(name)?;
        if !self.catalog.references(&url) && self.pools.remove(&url) {
            info!(name, "released pool of removed connection");
        }
        Ok(())
    }

    fn persistence(&self) -> Persistence {
        self.catalog.persistence()
    }

    async fn query_json(
        &self,
        connection: Option<String>,
        sql: String,
        binds: Vec<String>,
    ) -> ToolResult<Value> {
        let pool = self.connect(connection.as_deref())?;
        let wrapped = sql::json_rows(&sql);
        let mut query = sqlx::query_scalar::<_, Value>(&wrapped);
        for bind in binds {
            query = query.bind(bind);
        }
        query.fetch_one(&*pool).await.map_err(map_sqlx_error)
    }

    async fn execute(
        &self,
        connection: Option<String>,
        statements: Vec<String>,
    ) -> ToolResult<()> {
        let pool = self.connect(connection.as_deref())?;
        let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
        for statement in &statements {
            debug!(statement = %statement, "executing");
            sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(statement))
                .await
                .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        info!(statements = statements.len(), "statements committed");
        Ok(())
    }

    async fn insert_rows(
        &self,
        connection: Option<String>,
        table: String,
        rows: Vec<Value>,
        truncate: bool,
    ) -> ToolResult<u64> {
        let pool = self.connect(connection.as_deref())?;
        let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
        if truncate {
            let statement = format!("TRUNCATE TABLE {table}");
            sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&statement))
                .await
                .map_err(map_sqlx_error)?;
        }
        let inserted = if rows.is_empty() {
            0
        } else {
            let statement = format!(
                "INSERT INTO {table} SELECT * FROM jsonb_populate_recordset(NULL::{table}, $1)"
            );
            sqlx::Executor::execute(&mut *tx, sqlx::query(&statement).bind(Value::Array(rows)))
                .await
                .map_err(map_sqlx_error)?
                .rows_affected()
        };
        tx.commit().await.map_err(map_sqlx_error)?;
        info!(table = %table, inserted, truncate, "rows imported");
        Ok(inserted)
    }
}
