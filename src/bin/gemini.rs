//! Gemini image generation MCP server binary.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mcp_adapters::adapters::gemini::GeminiClient;
use mcp_adapters::config::GeminiConfig;
use mcp_adapters::mcp::tools::ImageTools;
use mcp_adapters::mcp::{ServerSpec, launch};

const SPEC: ServerSpec = ServerSpec {
    name: "gemini-image-mcp",
    version: env!("CARGO_PKG_VERSION"),
    instructions: "Generate images from text prompts with Gemini and save them to disk.",
};

#[derive(Parser)]
#[command(name = "gemini-image-mcp")]
#[command(author, version, about = "MCP server for Gemini image generation", long_about = None)]
struct Cli {
    /// Include error details in failed tool results and log at debug level
    #[arg(long, env = "MCP_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    launch(SPEC, cli.debug, |dispatcher| {
        let config = GeminiConfig::from_env()?;
        let output_dir = config.output_dir.clone();
        let client = GeminiClient::new(config)?;
        tracing::info!(
            model = client.model(),
            output_dir = %output_dir.display(),
            "image model configured"
        );
        dispatcher.register(ImageTools::new(Arc::new(client), output_dir))?;
        Ok(())
    })
    .await
    .into()
}
