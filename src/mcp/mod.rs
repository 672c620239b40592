//! Model Context Protocol (MCP) server implementation
//!
//! Every binary runs the same stdio server over a different tool family.
//!
//! # Architecture
//!
//! - **registry**: `ToolRegistry` trait and the `Dispatcher` that routes calls
//! - **server**: rmcp `ServerHandler` delegating to the dispatcher
//! - **transport**: process lifecycle (tracing, panic hook, signals, stdio)
//! - **health**: built-in `health` tool
//! - **tools**: one struct per external system
//!   - WorkflowTools: n8n workflows and executions
//!   - ImageTools: Gemini image generation
//!   - DatabaseTools: PostgreSQL
//!   - VaultTools: Obsidian vault
//!
//! Each tool struct is generic over its adapter trait (e.g. `A: WorkflowApi`)
//! so tests can substitute mocks without dynamic dispatch.

pub mod health;
pub mod registry;
pub mod server;
pub mod tools;
pub mod transport;

#[cfg(test)]
mod registry_test;

pub use registry::{Dispatcher, ToolRegistry};
pub use server::AdapterServer;
pub use transport::{Exit, ServerSpec, StartupError, launch};
