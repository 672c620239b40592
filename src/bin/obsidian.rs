//! Obsidian vault MCP server binary.
//!
//! Requires the Local REST API community plugin running in Obsidian.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mcp_adapters::adapters::obsidian::ObsidianClient;
use mcp_adapters::config::ObsidianConfig;
use mcp_adapters::mcp::tools::VaultTools;
use mcp_adapters::mcp::{ServerSpec, launch};

const SPEC: ServerSpec = ServerSpec {
    name: "obsidian-mcp",
    version: env!("CARGO_PKG_VERSION"),
    instructions: "Read, search and edit notes in an Obsidian vault. Paths are relative to \
                   the vault root.",
};

#[derive(Parser)]
#[command(name = "obsidian-mcp")]
#[command(author, version, about = "MCP server for an Obsidian vault", long_about = None)]
struct Cli {
    /// Include error details in failed tool results and log at debug level
    #[arg(long, env = "MCP_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    launch(SPEC, cli.debug, |dispatcher| {
        let client = ObsidianClient::new(ObsidianConfig::from_env()?)?;
        dispatcher.register(VaultTools::new(Arc::new(client)))?;
        Ok(())
    })
    .await
    .into()
}
