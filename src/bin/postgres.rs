//! PostgreSQL MCP server binary.
//!
//! Connection strings come from `POSTGRES_CONNECTIONS` (a JSON object of
//! named URLs) or a single `DATABASE_URL`. Pools are created lazily, so the
//! server starts even when a database is unreachable.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mcp_adapters::adapters::postgres::PostgresAdapter;
use mcp_adapters::config::PostgresConfig;
use mcp_adapters::mcp::tools::DatabaseTools;
use mcp_adapters::mcp::{ServerSpec, launch};

const SPEC: ServerSpec = ServerSpec {
    name: "postgres-mcp",
    version: env!("CARGO_PKG_VERSION"),
    instructions: "Query and administer PostgreSQL databases. Every tool accepts an optional \
                   'connection' (a configured name or a postgres:// URL); the default \
                   connection is used otherwise. Only SELECT statements run through execute_query.",
};

#[derive(Parser)]
#[command(name = "postgres-mcp")]
#[command(author, version, about = "MCP server for PostgreSQL", long_about = None)]
struct Cli {
    /// Include error details in failed tool results and log at debug level
    #[arg(long, env = "MCP_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    launch(SPEC, cli.debug, |dispatcher| {
        let adapter = PostgresAdapter::new(PostgresConfig::from_env()?);
        dispatcher.register(DatabaseTools::new(Arc::new(adapter)))?;
        Ok(())
    })
    .await
    .into()
}
