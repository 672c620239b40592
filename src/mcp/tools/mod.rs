//! MCP tool families
//!
//! One struct per external system, each generic over its adapter trait so
//! tests can substitute mocks:
//! - WorkflowTools: n8n workflows and executions
//! - ImageTools: Gemini image generation
//! - DatabaseTools: PostgreSQL connections, queries and administration
//! - VaultTools: Obsidian vault notes

mod database;
mod images;
mod vault;
mod workflows;

pub use database::*;
pub use images::*;
pub use vault::*;
pub use workflows::*;

#[cfg(test)]
mod database_test;

use crate::error::{ToolError, ToolResult};

/// Checks an optional page size against `1..=max`.
pub(crate) fn check_limit(limit: Option<u32>, max: u32) -> ToolResult<Option<u32>> {
    match limit {
        Some(0) => Err(ToolError::validation("limit must be at least 1")),
        Some(n) if n > max => Err(ToolError::validation(format!(
            "limit must be at most {max}"
        ))),
        other => Ok(other),
    }
}
