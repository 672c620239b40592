//! Process lifecycle for the stdio servers.
//!
//! stdout carries the protocol, so all logging goes to stderr. Startup
//! failures are rendered with `miette` and exit with status 1. SIGINT and
//! SIGTERM exit with status 0 without draining in-flight calls.

use std::process::ExitCode;

use miette::Diagnostic;
use rmcp::ServiceExt;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use super::registry::{Dispatcher, in_request, panic_message};
use super::server::AdapterServer;
use crate::adapters::http::install_crypto_provider;
use crate::error::{ConfigError, ToolError};

/// Errors that stop a server before or while serving.
#[derive(Error, Diagnostic, Debug)]
pub enum StartupError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to initialise adapter: {0}")]
    #[diagnostic(code(mcp_adapters::startup::adapter))]
    Adapter(#[from] ToolError),

    #[error("MCP transport error: {0}")]
    #[diagnostic(code(mcp_adapters::startup::transport))]
    Transport(String),
}

/// How the process should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Clean,
    Failure,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Clean => ExitCode::SUCCESS,
            Exit::Failure => ExitCode::FAILURE,
        }
    }
}

/// Static description of one server binary.
#[derive(Debug, Clone, Copy)]
pub struct ServerSpec {
    pub name: &'static str,
    pub version: &'static str,
    pub instructions: &'static str,
}

/// Initialize tracing on stderr with an env filter.
///
/// `RUST_LOG` wins; otherwise `mcp_adapters=info`, or `debug` with `--debug`.
pub fn init_tracing(debug: bool) {
    let default = if debug {
        "mcp_adapters=debug,rmcp=info"
    } else {
        "mcp_adapters=info"
    };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .try_init();
}

/// Logs every panic. Panics outside a tool invocation terminate the process.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let message = panic_message(info.payload());
        let location = info
            .location()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        if in_request() {
            error!(panic = %message, %location, "panic during tool invocation");
        } else {
            error!(panic = %message, %location, "fatal panic outside tool invocation");
            std::process::exit(1);
        }
    }));
}

/// Registers SIGINT and SIGTERM listeners immediately; the returned future
/// resolves when either arrives.
#[cfg(unix)]
pub fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    use tokio::signal::unix::{SignalKind, signal};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());
    async move {
        tokio::select! {
            _ = wait_for(interrupt, "SIGINT") => info!("received SIGINT"),
            _ = wait_for(terminate, "SIGTERM") => info!("received SIGTERM"),
        }
    }
}

#[cfg(unix)]
async fn wait_for(listener: std::io::Result<tokio::signal::unix::Signal>, name: &'static str) {
    match listener {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(e) => {
            error!(error = %e, signal = name, "failed to listen for signal");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> impl std::future::Future<Output = ()> {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
        info!("received SIGINT");
    }
}

/// Serves `server` over stdin/stdout until the peer disconnects.
pub async fn serve_stdio(server: AdapterServer) -> Result<(), StartupError> {
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| StartupError::Transport(e.to_string()))?;
    service
        .waiting()
        .await
        .map_err(|e| StartupError::Transport(e.to_string()))?;
    Ok(())
}

/// Builds the dispatcher for one server: its tool family plus `health`.
pub fn build_dispatcher<F>(spec: &ServerSpec, register: F) -> Result<Dispatcher, StartupError>
where
    F: FnOnce(&mut Dispatcher) -> Result<(), StartupError>,
{
    let mut dispatcher = Dispatcher::new();
    register(&mut dispatcher)?;
    dispatcher.register_health(spec.name, spec.version)?;
    Ok(dispatcher)
}

/// Full lifecycle of a server binary.
///
/// `setup` loads configuration and registers the tool family; any error it
/// returns is reported to stderr and the process exits with status 1.
pub async fn launch<F>(spec: ServerSpec, debug: bool, setup: F) -> Exit
where
    F: FnOnce(&mut Dispatcher) -> Result<(), StartupError>,
{
    install_crypto_provider();
    init_tracing(debug);
    install_panic_hook();

    let dispatcher = match build_dispatcher(&spec, setup) {
        Ok(dispatcher) => dispatcher,
        Err(err) => {
            error!(error = %err, server = spec.name, "startup failed");
            eprintln!("{:?}", miette::Report::new(err));
            return Exit::Failure;
        }
    };
    let shutdown = shutdown_signal();
    info!(
        server = spec.name,
        version = spec.version,
        tools = dispatcher.tool_count(),
        "server ready on stdio"
    );

    let server = AdapterServer::new(dispatcher, spec.instructions, debug);
    tokio::select! {
        result = serve_stdio(server) => match result {
            Ok(()) => {
                info!(server = spec.name, "client disconnected");
                Exit::Clean
            }
            Err(err) => {
                error!(error = %err, "transport failed");
                eprintln!("{:?}", miette::Report::new(err));
                Exit::Failure
            }
        },
        _ = shutdown => {
            // The blocking stdin read cannot be cancelled and would keep the
            // runtime from shutting down.
            std::process::exit(0)
        }
    }
}
