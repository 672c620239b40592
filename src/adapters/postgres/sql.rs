//! SQL text builders.
//!
//! Identifiers are validated and double-quoted. Type names and default or
//! filter expressions are passed through verbatim after a lexical check that
//! rejects statement separators and comments.

use rmcp::{schemars, schemars::JsonSchema};
use serde::{Deserialize, Serialize};

use crate::error::{ToolError, ToolResult};

const MAX_IDENTIFIER_LEN: usize = 63;

/// Validates and double-quotes a single identifier.
pub fn quote_ident(name: &str) -> ToolResult<String> {
    let name = name.trim();
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start
        || name.len() > MAX_IDENTIFIER_LEN
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        return Err(ToolError::validation(format!(
            "invalid identifier '{name}': use letters, digits, '_' or '$' (max {MAX_IDENTIFIER_LEN} chars)"
        )));
    }
    Ok(format!("\"{name}\""))
}

/// Quotes `table` or `schema.table`.
pub fn qualified_name(table: &str) -> ToolResult<String> {
    let parts: Vec<&str> = table.trim().split('.').collect();
    match parts.as_slice() {
        [table] => quote_ident(table),
        [schema, table] => Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?)),
        _ => Err(ToolError::validation(format!(
            "invalid table name '{table}': expected table or schema.table"
        ))),
    }
}

/// Splits `schema.table` into its parts, defaulting the schema to `public`.
pub fn split_table(table: &str) -> ToolResult<(String, String)> {
    qualified_name(table)?;
    Ok(match table.trim().split_once('.') {
        Some((schema, name)) => (schema.to_string(), name.to_string()),
        None => ("public".to_string(), table.trim().to_string()),
    })
}

/// Admits only statements whose first token is `select`.
///
/// Leading whitespace is skipped and trailing semicolons are removed. This
/// is a lexical allow-list, not a parser.
pub fn ensure_read_only(sql: &str) -> ToolResult<String> {
    let trimmed = sql.trim_start();
    let first_token: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if !first_token.eq_ignore_ascii_case("select") {
        return Err(ToolError::validation(
            "only SELECT statements are allowed",
        ));
    }
    Ok(trimmed
        .trim_end()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string())
}

/// Rejects expression text that could end the statement or hide a comment.
pub fn check_fragment(kind: &str, text: &str) -> ToolResult<()> {
    if text.trim().is_empty() {
        return Err(ToolError::validation(format!("{kind} must not be empty")));
    }
    if text.contains(';') || text.contains("--") || text.contains("/*") {
        return Err(ToolError::validation(format!(
            "{kind} must not contain ';' or SQL comments"
        )));
    }
    Ok(())
}

/// Accepts type names such as `varchar(255)`, `numeric(10, 2)`, `text[]`,
/// `timestamp with time zone`.
pub fn check_type_name(data_type: &str) -> ToolResult<()> {
    let ok = !data_type.trim().is_empty()
        && data_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || " _(),[].".contains(c));
    if ok {
        Ok(())
    } else {
        Err(ToolError::validation(format!(
            "invalid data type '{data_type}'"
        )))
    }
}

/// Wraps a row-returning statement so the whole result is one JSON array.
///
/// The inner statement ends on its own line so a trailing `--` comment
/// cannot swallow the closing parenthesis.
pub fn json_rows(sql: &str) -> String {
    format!("SELECT COALESCE(json_agg(q), '[]'::json) FROM ({sql}\n) AS q")
}

/// Applies an outer row limit to an arbitrary SELECT.
pub fn limited(sql: &str, limit: Option<u32>) -> String {
    match limit {
        Some(limit) => format!("SELECT * FROM ({sql}\n) AS limited LIMIT {limit}"),
        None => sql.to_string(),
    }
}

/// Column definition for `create_table` and `add_column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSpec {
    #[schemars(description = "Column name")]
    pub name: String,
    #[schemars(description = "PostgreSQL type, e.g. 'text', 'integer', 'varchar(64)'")]
    pub data_type: String,
    #[schemars(description = "Allow NULL values (default: true)")]
    pub nullable: Option<bool>,
    #[schemars(description = "Default value expression, e.g. 'now()' or '0'")]
    pub default: Option<String>,
    #[schemars(description = "Part of the primary key")]
    #[serde(default)]
    pub primary_key: bool,
    #[schemars(description = "Add a UNIQUE constraint")]
    #[serde(default)]
    pub unique: bool,
}

impl ColumnSpec {
    fn definition(&self, inline_primary_key: bool) -> ToolResult<String> {
        check_type_name(&self.data_type)?;
        let mut def = format!("{} {}", quote_ident(&self.name)?, self.data_type.trim());
        if self.nullable == Some(false) {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            check_fragment("default", default)?;
            def.push_str(&format!(" DEFAULT {default}"));
        }
        if inline_primary_key && self.primary_key {
            def.push_str(" PRIMARY KEY");
        }
        if self.unique {
            def.push_str(" UNIQUE");
        }
        Ok(def)
    }
}

pub fn create_table_sql(
    table: &str,
    columns: &[ColumnSpec],
    if_not_exists: bool,
) -> ToolResult<String> {
    if columns.is_empty() {
        return Err(ToolError::validation("at least one column is required"));
    }
    let keys: Vec<&ColumnSpec> = columns.iter().filter(|c| c.primary_key).collect();
    let composite = keys.len() > 1;

    let mut parts = columns
        .iter()
        .map(|c| c.definition(!composite))
        .collect::<ToolResult<Vec<_>>>()?;
    if composite {
        let names = keys
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<ToolResult<Vec<_>>>()?;
        parts.push(format!("PRIMARY KEY ({})", names.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {}{} ({})",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        qualified_name(table)?,
        parts.join(", ")
    ))
}

/// One `ALTER TABLE` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AlterOperation {
    AddColumn {
        column: ColumnSpec,
    },
    DropColumn {
        name: String,
        #[serde(default)]
        cascade: bool,
    },
    AlterType {
        name: String,
        data_type: String,
        /// Conversion expression for `USING`.
        using: Option<String>,
    },
    SetNullable {
        name: String,
        nullable: bool,
    },
    /// `default: null` drops the default.
    SetDefault {
        name: String,
        default: Option<String>,
    },
    RenameColumn {
        name: String,
        new_name: String,
    },
}

impl AlterOperation {
    fn clause(&self) -> ToolResult<String> {
        Ok(match self {
            Self::AddColumn { column } => format!("ADD COLUMN {}", column.definition(true)?),
            Self::DropColumn { name, cascade } => format!(
                "DROP COLUMN {}{}",
                quote_ident(name)?,
                if *cascade { " CASCADE" } else { "" }
            ),
            Self::AlterType {
                name,
                data_type,
                using,
            } => {
                check_type_name(data_type)?;
                let mut clause = format!(
                    "ALTER COLUMN {} TYPE {}",
                    quote_ident(name)?,
                    data_type.trim()
                );
                if let Some(using) = using {
                    check_fragment("using", using)?;
                    clause.push_str(&format!(" USING {using}"));
                }
                clause
            }
            Self::SetNullable { name, nullable } => format!(
                "ALTER COLUMN {} {} NOT NULL",
                quote_ident(name)?,
                if *nullable { "DROP" } else { "SET" }
            ),
            Self::SetDefault { name, default } => match default {
                Some(default) => {
                    check_fragment("default", default)?;
                    format!("ALTER COLUMN {} SET DEFAULT {default}", quote_ident(name)?)
                }
                None => format!("ALTER COLUMN {} DROP DEFAULT", quote_ident(name)?),
            },
            Self::RenameColumn { name, new_name } => format!(
                "RENAME COLUMN {} TO {}",
                quote_ident(name)?,
                quote_ident(new_name)?
            ),
        })
    }
}

/// One statement per operation; run them in a single transaction.
pub fn alter_table_sql(table: &str, operations: &[AlterOperation]) -> ToolResult<Vec<String>> {
    if operations.is_empty() {
        return Err(ToolError::validation("at least one operation is required"));
    }
    let table = qualified_name(table)?;
    operations
        .iter()
        .map(|op| Ok(format!("ALTER TABLE {table} {}", op.clause()?)))
        .collect()
}

pub fn select_rows_sql(
    table: &str,
    filter: Option<&str>,
    limit: Option<u32>,
) -> ToolResult<String> {
    let mut sql = format!("SELECT * FROM {}", qualified_name(table)?);
    if let Some(filter) = filter {
        check_fragment("where", filter)?;
        sql.push_str(&format!(" WHERE {filter}"));
    }
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(sql)
}

pub const LIST_TABLES: &str = "SELECT table_name::text AS table_name, table_type::text AS table_type \
     FROM information_schema.tables WHERE table_schema::text = $1 ORDER BY table_name";

pub const LIST_COLUMNS: &str = "SELECT column_name::text AS column_name, data_type::text AS data_type, \
     is_nullable::text = 'YES' AS nullable, column_default::text AS column_default, \
     character_maximum_length::int AS max_length \
     FROM information_schema.columns \
     WHERE table_schema::text = $1 AND table_name::text = $2 ORDER BY ordinal_position";

pub const LIST_INDEXES: &str = "SELECT indexname::text AS index_name, indexdef AS definition \
     FROM pg_indexes WHERE schemaname::text = $1 AND tablename::text = $2 ORDER BY indexname";

pub const LIST_CONSTRAINTS: &str = "SELECT tc.constraint_name::text AS constraint_name, \
     tc.constraint_type::text AS constraint_type, kcu.column_name::text AS column_name \
     FROM information_schema.table_constraints tc \
     LEFT JOIN information_schema.key_column_usage kcu \
       ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
     WHERE tc.table_schema::text = $1 AND tc.table_name::text = $2 \
     ORDER BY tc.constraint_name";

/// A named diagnostic query.
pub type NamedQuery = (&'static str, &'static str);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Configuration,
    Performance,
    Security,
}

impl AnalysisType {
    pub fn queries(self) -> &'static [NamedQuery] {
        match self {
            Self::Configuration => &[
                (
                    "version",
                    "SELECT version() AS version",
                ),
                (
                    "settings",
                    "SELECT name, setting, unit, category FROM pg_settings \
                     WHERE name IN ('max_connections', 'shared_buffers', 'work_mem', \
                     'maintenance_work_mem', 'effective_cache_size', 'wal_level', \
                     'checkpoint_timeout', 'autovacuum', 'statement_timeout', \
                     'log_min_duration_statement') ORDER BY name",
                ),
            ],
            Self::Performance => &[
                (
                    "cache_hit_ratio",
                    "SELECT datname, \
                     round(blks_hit * 100.0 / NULLIF(blks_hit + blks_read, 0), 2) AS hit_ratio_pct \
                     FROM pg_stat_database WHERE datname = current_database()",
                ),
                (
                    "sequential_scans",
                    "SELECT schemaname, relname, seq_scan, idx_scan, n_live_tup \
                     FROM pg_stat_user_tables ORDER BY seq_scan DESC LIMIT 10",
                ),
                (
                    "unused_indexes",
                    "SELECT schemaname, relname, indexrelname, idx_scan \
                     FROM pg_stat_user_indexes WHERE idx_scan = 0 ORDER BY relname LIMIT 20",
                ),
                (
                    "dead_tuples",
                    "SELECT schemaname, relname, n_dead_tup, last_autovacuum \
                     FROM pg_stat_user_tables WHERE n_dead_tup > 0 \
                     ORDER BY n_dead_tup DESC LIMIT 10",
                ),
            ],
            Self::Security => &[
                (
                    "superusers",
                    "SELECT rolname FROM pg_roles WHERE rolsuper ORDER BY rolname",
                ),
                (
                    "login_roles",
                    "SELECT rolname, rolcreaterole, rolcreatedb, rolvaliduntil \
                     FROM pg_roles WHERE rolcanlogin ORDER BY rolname",
                ),
                (
                    "ssl",
                    "SELECT name, setting FROM pg_settings \
                     WHERE name IN ('ssl', 'password_encryption')",
                ),
                (
                    "public_schema_grants",
                    "SELECT grantee, privilege_type FROM information_schema.role_table_grants \
                     WHERE grantee = 'PUBLIC' AND table_schema = 'public' LIMIT 50",
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DebugIssue {
    Connection,
    Performance,
    Locks,
    Replication,
}

impl DebugIssue {
    pub fn queries(self) -> &'static [NamedQuery] {
        match self {
            Self::Connection => &[
                (
                    "connection_usage",
                    "SELECT count(*) AS current, \
                     (SELECT setting::int FROM pg_settings WHERE name = 'max_connections') AS max \
                     FROM pg_stat_activity",
                ),
                (
                    "by_state",
                    "SELECT coalesce(state, 'unknown') AS state, count(*) AS count \
                     FROM pg_stat_activity GROUP BY state ORDER BY count DESC",
                ),
                (
                    "idle_in_transaction",
                    "SELECT pid, usename, now() - state_change AS idle_for \
                     FROM pg_stat_activity WHERE state = 'idle in transaction' \
                     ORDER BY idle_for DESC LIMIT 20",
                ),
            ],
            Self::Performance => &[
                (
                    "long_running_queries",
                    "SELECT pid, usename, now() - query_start AS duration, left(query, 200) AS query \
                     FROM pg_stat_activity WHERE state = 'active' AND pid <> pg_backend_pid() \
                     ORDER BY duration DESC LIMIT 10",
                ),
                (
                    "table_bloat_candidates",
                    "SELECT schemaname, relname, n_dead_tup, n_live_tup \
                     FROM pg_stat_user_tables WHERE n_dead_tup > n_live_tup * 0.2 \
                     ORDER BY n_dead_tup DESC LIMIT 10",
                ),
            ],
            Self::Locks => &[
                (
                    "blocked_queries",
                    "SELECT blocked.pid AS blocked_pid, blocked.usename AS blocked_user, \
                     blocking.pid AS blocking_pid, blocking.usename AS blocking_user, \
                     left(blocked.query, 200) AS blocked_query \
                     FROM pg_stat_activity blocked \
                     JOIN pg_stat_activity blocking \
                       ON blocking.pid = ANY(pg_blocking_pids(blocked.pid))",
                ),
                (
                    "lock_counts",
                    "SELECT mode, granted, count(*) AS count FROM pg_locks \
                     GROUP BY mode, granted ORDER BY count DESC",
                ),
            ],
            Self::Replication => &[
                (
                    "recovery",
                    "SELECT pg_is_in_recovery() AS in_recovery",
                ),
                (
                    "replicas",
                    "SELECT client_addr::text AS client_addr, state, sync_state, \
                     replay_lag::text AS replay_lag FROM pg_stat_replication",
                ),
                (
                    "slots",
                    "SELECT slot_name, slot_type, active FROM pg_replication_slots",
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Connections,
    Activity,
    Locks,
    Tables,
    Size,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Self::Connections,
        Self::Activity,
        Self::Locks,
        Self::Tables,
        Self::Size,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Connections => "connections",
            Self::Activity => "activity",
            Self::Locks => "locks",
            Self::Tables => "tables",
            Self::Size => "size",
        }
    }

    pub fn query(self) -> &'static str {
        match self {
            Self::Connections => {
                "SELECT datname, count(*) AS connections FROM pg_stat_activity \
                 WHERE datname IS NOT NULL GROUP BY datname ORDER BY connections DESC"
            }
            Self::Activity => {
                "SELECT pid, usename, state, now() - query_start AS running_for, \
                 left(query, 200) AS query FROM pg_stat_activity \
                 WHERE state IS NOT NULL AND pid <> pg_backend_pid() \
                 ORDER BY query_start NULLS LAST LIMIT 20"
            }
            Self::Locks => {
                "SELECT locktype, mode, granted, count(*) AS count FROM pg_locks \
                 GROUP BY locktype, mode, granted ORDER BY count DESC"
            }
            Self::Tables => {
                "SELECT schemaname, relname, n_live_tup, n_dead_tup, seq_scan, idx_scan, \
                 last_vacuum, last_analyze FROM pg_stat_user_tables \
                 ORDER BY n_live_tup DESC LIMIT 20"
            }
            Self::Size => {
                "SELECT current_database() AS database, \
                 pg_size_pretty(pg_database_size(current_database())) AS size, \
                 pg_database_size(current_database()) AS size_bytes"
            }
        }
    }
}
