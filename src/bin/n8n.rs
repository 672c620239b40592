//! n8n workflow MCP server binary.
//!
//! Reads `N8N_API_URL` and `N8N_API_KEY` from the environment and serves the
//! workflow tools over stdio.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mcp_adapters::adapters::n8n::N8nClient;
use mcp_adapters::config::N8nConfig;
use mcp_adapters::mcp::tools::WorkflowTools;
use mcp_adapters::mcp::{ServerSpec, launch};

const SPEC: ServerSpec = ServerSpec {
    name: "n8n-mcp",
    version: env!("CARGO_PKG_VERSION"),
    instructions: "Manage n8n workflows: list, inspect, activate or deactivate them, \
                   run them through their Webhook trigger, and inspect executions.",
};

#[derive(Parser)]
#[command(name = "n8n-mcp")]
#[command(author, version, about = "MCP server for n8n workflows", long_about = None)]
struct Cli {
    /// Include error details in failed tool results and log at debug level
    #[arg(long, env = "MCP_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    launch(SPEC, cli.debug, |dispatcher| {
        let client = N8nClient::new(N8nConfig::from_env()?)?;
        dispatcher.register(WorkflowTools::new(Arc::new(client)))?;
        Ok(())
    })
    .await
    .into()
}
