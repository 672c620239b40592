//! Database tool implementations
//!
//! Handles the PostgreSQL tools: connection management, read-only queries,
//! schema inspection and DDL, table export/import/copy, and diagnostics.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rmcp::model::Tool;
use rmcp::{schemars, schemars::JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::info;

use super::check_limit;
use crate::adapters::postgres::SqlBackend;
use crate::adapters::postgres::sql::{
    self, AlterOperation, AnalysisType, ColumnSpec, DebugIssue, Metric, NamedQuery,
};
use crate::error::{ToolError, ToolResult};
use crate::mcp::registry::{
    ToolFuture, ToolRegistry, descriptor, require_non_empty, with_params,
};

const MAX_ROWS: u32 = 10_000;
const PERSISTENCE_NOTE: &str =
    "Connection changes last until the server restarts and are not saved anywhere.";

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListConnectionsParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddConnectionParams {
    #[schemars(description = "Name used to refer to this connection")]
    pub name: String,
    #[schemars(description = "postgres:// connection string")]
    pub connection_string: String,
    #[schemars(description = "Make this the default connection")]
    pub make_default: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RemoveConnectionParams {
    #[schemars(description = "Name of the connection to remove")]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteQueryParams {
    #[schemars(description = "A single SELECT statement")]
    pub sql: String,
    #[schemars(description = "Maximum rows to return (1-10000)")]
    pub limit: Option<u32>,
    #[schemars(description = "Connection name or URL (default connection when omitted)")]
    pub connection: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetSchemaInfoParams {
    #[schemars(description = "Schema to list tables from (default: public)")]
    pub schema: Option<String>,
    #[schemars(description = "Table (or schema.table) to describe in detail")]
    pub table: Option<String>,
    #[schemars(description = "Connection name or URL (default connection when omitted)")]
    pub connection: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateTableParams {
    #[schemars(description = "Table name, optionally schema-qualified")]
    pub table: String,
    #[schemars(description = "Column definitions")]
    pub columns: Vec<ColumnSpec>,
    #[schemars(description = "Skip creation when the table already exists")]
    pub if_not_exists: Option<bool>,
    #[schemars(description = "Connection name or URL (default connection when omitted)")]
    pub connection: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AlterTableParams {
    #[schemars(description = "Table name, optionally schema-qualified")]
    pub table: String,
    #[schemars(
        description = "Operations applied in order in one transaction; each has an 'action' of add_column, drop_column, alter_type, set_nullable, set_default or rename_column"
    )]
    pub operations: Vec<AlterOperation>,
    #[schemars(description = "Connection name or URL (default connection when omitted)")]
    pub connection: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Json,
    Csv,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExportTableDataParams {
    #[schemars(description = "Table name, optionally schema-qualified")]
    pub table: String,
    #[schemars(description = "File to write")]
    pub output_path: String,
    #[schemars(description = "json or csv")]
    pub format: DataFormat,
    #[serde(rename = "where")]
    #[schemars(description = "Row filter expression, without the WHERE keyword")]
    pub filter: Option<String>,
    #[schemars(description = "Maximum rows to export (1-10000)")]
    pub limit: Option<u32>,
    #[schemars(description = "Connection name or URL (default connection when omitted)")]
    pub connection: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ImportTableDataParams {
    #[schemars(description = "Existing table name, optionally schema-qualified")]
    pub table: String,
    #[schemars(description = "File to read")]
    pub input_path: String,
    #[schemars(description = "json (array of objects) or csv (with a header row)")]
    pub format: DataFormat,
    #[schemars(description = "Empty the table before importing")]
    pub truncate: Option<bool>,
    #[schemars(description = "Connection name or URL (default connection when omitted)")]
    pub connection: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CopyBetweenDatabasesParams {
    #[schemars(description = "Connection to read from")]
    pub source_connection: String,
    #[schemars(description = "Connection to write to; the table must already exist there")]
    pub target_connection: String,
    #[schemars(description = "Table name, optionally schema-qualified")]
    pub table: String,
    #[serde(rename = "where")]
    #[schemars(description = "Row filter expression for the source rows")]
    pub filter: Option<String>,
    #[schemars(description = "Maximum rows to copy (default and max: 10000)")]
    pub limit: Option<u32>,
    #[schemars(description = "Empty the target table first")]
    pub truncate_target: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeDatabaseParams {
    #[schemars(description = "configuration, performance or security")]
    pub analysis_type: AnalysisType,
    #[schemars(description = "Connection name or URL (default connection when omitted)")]
    pub connection: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DebugDatabaseParams {
    #[schemars(description = "connection, performance, locks or replication")]
    pub issue: DebugIssue,
    #[schemars(description = "Connection name or URL (default connection when omitted)")]
    pub connection: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MonitorDatabaseParams {
    #[schemars(description = "Metrics to collect (default: all of connections, activity, locks, tables, size)")]
    pub metrics: Option<Vec<Metric>>,
    #[schemars(description = "Connection name or URL (default connection when omitted)")]
    pub connection: Option<String>,
}

fn connection(raw: Option<String>) -> Option<String> {
    raw.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

fn row_count(rows: &Value) -> usize {
    rows.as_array().map_or(0, Vec::len)
}

fn file_error(action: &str, path: &Path, err: impl std::fmt::Display) -> ToolError {
    ToolError::remote(None, format!("failed to {action} {}: {err}", path.display()))
}

fn csv_error(err: csv::Error) -> ToolError {
    ToolError::validation(format!("invalid CSV: {err}"))
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders JSON rows as CSV. Columns are the union of all row keys in order
/// of first appearance.
pub fn rows_to_csv(rows: &[Value]) -> ToolResult<String> {
    let mut headers: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.as_object().into_iter().flat_map(Map::keys) {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers).map_err(csv_error)?;
    for row in rows {
        let record: Vec<String> = headers
            .iter()
            .map(|h| row.get(*h).map(csv_cell).unwrap_or_default())
            .collect();
        writer.write_record(&record).map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ToolError::remote(None, format!("failed to encode CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ToolError::remote(None, e.to_string()))
}

/// Parses CSV with a header row into JSON objects. Empty cells become null.
pub fn csv_to_rows(text: &str) -> ToolResult<Vec<Value>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader.headers().map_err(csv_error)?.clone();
    reader
        .records()
        .map(|record| {
            let record = record.map_err(csv_error)?;
            let row: Map<String, Value> = headers
                .iter()
                .zip(record.iter())
                .map(|(h, cell)| {
                    let value = if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    };
                    (h.to_string(), value)
                })
                .collect();
            Ok(Value::Object(row))
        })
        .collect()
}

/// Parses a JSON array of objects.
pub fn json_to_rows(text: &str) -> ToolResult<Vec<Value>> {
    let rows: Vec<Value> = serde_json::from_str(text)
        .map_err(|e| ToolError::validation(format!("expected a JSON array of objects: {e}")))?;
    if let Some(index) = rows.iter().position(|r| !r.is_object()) {
        return Err(ToolError::validation(format!(
            "row {index} is not a JSON object"
        )));
    }
    Ok(rows)
}

/// PostgreSQL tools
pub struct DatabaseTools<B: SqlBackend> {
    backend: Arc<B>,
}

impl<B: SqlBackend> Clone for DatabaseTools<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: SqlBackend + 'static> DatabaseTools<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn list_connections(&self, _params: ListConnectionsParams) -> ToolResult<Value> {
        Ok(json!({
            "connections": self.backend.list_connections(),
            "persistence": self.backend.persistence(),
        }))
    }

    pub async fn add_connection(&self, params: AddConnectionParams) -> ToolResult<Value> {
        let name = require_non_empty("name", &params.name)?;
        let url = require_non_empty("connection_string", &params.connection_string)?;
        let info = self
            .backend
            .add_connection(name, url, params.make_default.unwrap_or(false))?;
        Ok(json!({
            "connection": info,
            "persistence": self.backend.persistence(),
            "note": PERSISTENCE_NOTE,
        }))
    }

    pub async fn remove_connection(&self, params: RemoveConnectionParams) -> ToolResult<Value> {
        let name = require_non_empty("name", &params.name)?;
        self.backend.remove_connection(name)?;
        Ok(json!({
            "removed": name,
            "persistence": self.backend.persistence(),
            "note": PERSISTENCE_NOTE,
        }))
    }

    pub async fn execute_query(&self, params: ExecuteQueryParams) -> ToolResult<Value> {
        let statement = sql::ensure_read_only(&params.sql)?;
        let limit = check_limit(params.limit, MAX_ROWS)?;
        let rows = self
            .backend
            .query_json(
                connection(params.connection),
                sql::limited(&statement, limit),
                Vec::new(),
            )
            .await?;
        Ok(json!({ "row_count": row_count(&rows), "rows": rows }))
    }

    pub async fn get_schema_info(&self, params: GetSchemaInfoParams) -> ToolResult<Value> {
        let conn = connection(params.connection);
        let table = params.table.filter(|t| !t.trim().is_empty());

        let Some(table) = table else {
            let schema = params
                .schema
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "public".to_string());
            sql::quote_ident(&schema)?;
            let tables = self
                .backend
                .query_json(conn, sql::LIST_TABLES.to_string(), vec![schema.clone()])
                .await?;
            return Ok(json!({ "schema": schema, "tables": tables }));
        };

        let (schema, name) = match (params.schema, table.contains('.')) {
            (Some(schema), false) if !schema.trim().is_empty() => {
                sql::split_table(&format!("{}.{}", schema.trim(), table.trim()))?
            }
            _ => sql::split_table(&table)?,
        };
        let binds = vec![schema.clone(), name.clone()];
        let columns = self
            .backend
            .query_json(conn.clone(), sql::LIST_COLUMNS.to_string(), binds.clone())
            .await?;
        if row_count(&columns) == 0 {
            return Err(ToolError::not_found(format!("table '{schema}.{name}'")));
        }
        let indexes = self
            .backend
            .query_json(conn.clone(), sql::LIST_INDEXES.to_string(), binds.clone())
            .await?;
        let constraints = self
            .backend
            .query_json(conn, sql::LIST_CONSTRAINTS.to_string(), binds)
            .await?;
        Ok(json!({
            "schema": schema,
            "table": name,
            "columns": columns,
            "indexes": indexes,
            "constraints": constraints,
        }))
    }

    pub async fn create_table(&self, params: CreateTableParams) -> ToolResult<Value> {
        let statement = sql::create_table_sql(
            &params.table,
            &params.columns,
            params.if_not_exists.unwrap_or(false),
        )?;
        self.backend
            .execute(connection(params.connection), vec![statement.clone()])
            .await?;
        info!(table = %params.table.trim(), "table created");
        Ok(json!({ "table": params.table.trim(), "sql": statement }))
    }

    pub async fn alter_table(&self, params: AlterTableParams) -> ToolResult<Value> {
        let statements = sql::alter_table_sql(&params.table, &params.operations)?;
        self.backend
            .execute(connection(params.connection), statements.clone())
            .await?;
        info!(table = %params.table.trim(), operations = statements.len(), "table altered");
        Ok(json!({ "table": params.table.trim(), "statements": statements }))
    }

    pub async fn export_table_data(&self, params: ExportTableDataParams) -> ToolResult<Value> {
        let output = require_non_empty("output_path", &params.output_path)?;
        let limit = check_limit(params.limit, MAX_ROWS)?;
        let select = sql::select_rows_sql(&params.table, params.filter.as_deref(), limit)?;

        let rows = self
            .backend
            .query_json(connection(params.connection), select, Vec::new())
            .await?;
        let rows = match rows {
            Value::Array(rows) => rows,
            other => vec![other],
        };
        let body = match params.format {
            DataFormat::Json => serde_json::to_string_pretty(&rows)
                .map_err(|e| ToolError::remote(None, format!("failed to encode JSON: {e}")))?,
            DataFormat::Csv => rows_to_csv(&rows)?,
        };

        let path = Path::new(output);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| file_error("create", parent, e))?;
        }
        tokio::fs::write(path, body)
            .await
            .map_err(|e| file_error("write", path, e))?;
        info!(table = %params.table.trim(), path = output, rows = rows.len(), "table exported");

        Ok(json!({
            "table": params.table.trim(),
            "output_path": output,
            "format": params.format,
            "row_count": rows.len(),
        }))
    }

    pub async fn import_table_data(&self, params: ImportTableDataParams) -> ToolResult<Value> {
        let table = sql::qualified_name(&params.table)?;
        let input = require_non_empty("input_path", &params.input_path)?;
        let path = Path::new(input);
        let text = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ToolError::not_found(format!("file '{input}'")),
            _ => file_error("read", path, e),
        })?;
        let rows = match params.format {
            DataFormat::Json => json_to_rows(&text)?,
            DataFormat::Csv => csv_to_rows(&text)?,
        };

        let imported = self
            .backend
            .insert_rows(
                connection(params.connection),
                table,
                rows,
                params.truncate.unwrap_or(false),
            )
            .await?;
        Ok(json!({ "table": params.table.trim(), "imported": imported }))
    }

    pub async fn copy_between_databases(
        &self,
        params: CopyBetweenDatabasesParams,
    ) -> ToolResult<Value> {
        let source = require_non_empty("source_connection", &params.source_connection)?;
        let target = require_non_empty("target_connection", &params.target_connection)?;
        if source == target {
            return Err(ToolError::validation(
                "source_connection and target_connection must differ",
            ));
        }
        let limit = check_limit(params.limit, MAX_ROWS)?.unwrap_or(MAX_ROWS);
        let table = sql::qualified_name(&params.table)?;
        let select = sql::select_rows_sql(&params.table, params.filter.as_deref(), Some(limit))?;

        let rows = match self
            .backend
            .query_json(Some(source.to_string()), select, Vec::new())
            .await?
        {
            Value::Array(rows) => rows,
            other => vec![other],
        };
        let read = rows.len();
        let copied = self
            .backend
            .insert_rows(
                Some(target.to_string()),
                table,
                rows,
                params.truncate_target.unwrap_or(false),
            )
            .await?;
        info!(source, target, table = %params.table.trim(), copied, "rows copied");
        Ok(json!({
            "table": params.table.trim(),
            "source_connection": source,
            "target_connection": target,
            "rows_read": read,
            "rows_copied": copied,
            "row_limit": limit,
        }))
    }

    async fn run_named(
        &self,
        conn: Option<String>,
        queries: &[NamedQuery],
    ) -> ToolResult<Map<String, Value>> {
        let mut results = Map::new();
        for (name, query) in queries {
            let rows = self
                .backend
                .query_json(conn.clone(), query.to_string(), Vec::new())
                .await?;
            results.insert(name.to_string(), rows);
        }
        Ok(results)
    }

    pub async fn analyze_database(&self, params: AnalyzeDatabaseParams) -> ToolResult<Value> {
        let results = self
            .run_named(connection(params.connection), params.analysis_type.queries())
            .await?;
        Ok(json!({
            "analysis_type": params.analysis_type,
            "results": results,
        }))
    }

    pub async fn debug_database(&self, params: DebugDatabaseParams) -> ToolResult<Value> {
        let results = self
            .run_named(connection(params.connection), params.issue.queries())
            .await?;
        Ok(json!({ "issue": params.issue, "results": results }))
    }

    pub async fn monitor_database(&self, params: MonitorDatabaseParams) -> ToolResult<Value> {
        let metrics = match params.metrics {
            Some(metrics) if !metrics.is_empty() => metrics,
            _ => Metric::ALL.to_vec(),
        };
        let queries: Vec<NamedQuery> = metrics.iter().map(|m| (m.name(), m.query())).collect();
        let results = self.run_named(connection(params.connection), &queries).await?;
        Ok(json!({
            "collected_at": Utc::now().to_rfc3339(),
            "metrics": results,
        }))
    }
}

impl<B: SqlBackend + 'static> ToolRegistry for DatabaseTools<B> {
    fn tools(&self) -> Vec<Tool> {
        vec![
            descriptor::<ListConnectionsParams>(
                "list_connections",
                "List named connections with masked passwords and the default marked.",
            ),
            descriptor::<AddConnectionParams>(
                "add_connection",
                "Add or replace a named connection for the rest of this server's lifetime.",
            ),
            descriptor::<RemoveConnectionParams>(
                "remove_connection",
                "Remove a named connection. The default connection cannot be removed.",
            ),
            descriptor::<ExecuteQueryParams>(
                "execute_query",
                "Run a read-only SELECT statement and return the rows as JSON.",
            ),
            descriptor::<GetSchemaInfoParams>(
                "get_schema_info",
                "List tables in a schema, or describe one table's columns, indexes and constraints.",
            ),
            descriptor::<CreateTableParams>(
                "create_table",
                "Create a table from column definitions.",
            ),
            descriptor::<AlterTableParams>(
                "alter_table",
                "Apply column changes to a table in one transaction.",
            ),
            descriptor::<ExportTableDataParams>(
                "export_table_data",
                "Export table rows to a JSON or CSV file.",
            ),
            descriptor::<ImportTableDataParams>(
                "import_table_data",
                "Import rows from a JSON or CSV file into an existing table.",
            ),
            descriptor::<CopyBetweenDatabasesParams>(
                "copy_between_databases",
                "Copy table rows from one connection to another.",
            ),
            descriptor::<AnalyzeDatabaseParams>(
                "analyze_database",
                "Report configuration, performance or security findings.",
            ),
            descriptor::<DebugDatabaseParams>(
                "debug_database",
                "Gather diagnostics for connection, performance, lock or replication issues.",
            ),
            descriptor::<MonitorDatabaseParams>(
                "monitor_database",
                "Collect live metrics: connections, activity, locks, tables, size.",
            ),
        ]
    }

    fn call<'a>(&'a self, name: &str, args: Value) -> Option<ToolFuture<'a>> {
        let future = match name {
            "list_connections" => with_params(args, move |p| self.list_connections(p)),
            "add_connection" => with_params(args, move |p| self.add_connection(p)),
            "remove_connection" => with_params(args, move |p| self.remove_connection(p)),
            "execute_query" => with_params(args, move |p| self.execute_query(p)),
            "get_schema_info" => with_params(args, move |p| self.get_schema_info(p)),
            "create_table" => with_params(args, move |p| self.create_table(p)),
            "alter_table" => with_params(args, move |p| self.alter_table(p)),
            "export_table_data" => with_params(args, move |p| self.export_table_data(p)),
            "import_table_data" => with_params(args, move |p| self.import_table_data(p)),
            "copy_between_databases" => {
                with_params(args, move |p| self.copy_between_databases(p))
            }
            "analyze_database" => with_params(args, move |p| self.analyze_database(p)),
            "debug_database" => with_params(args, move |p| self.debug_database(p)),
            "monitor_database" => with_params(args, move |p| self.monitor_database(p)),
            _ => return None,
        };
        Some(future)
    }
}
