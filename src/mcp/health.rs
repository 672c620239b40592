//! Built-in `health` tool reporting server name, version and tool count.

use rmcp::model::Tool;
use rmcp::{schemars, schemars::JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::{Dispatcher, ToolFuture, ToolRegistry, descriptor, to_payload};
use crate::error::ConfigError;

pub const HEALTH_TOOL: &str = "health";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct HealthParams {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub server_name: String,
    pub version: String,
    pub tool_count: usize,
}

pub struct HealthTools {
    server_name: String,
    version: String,
    total_tool_count: usize,
}

impl HealthTools {
    /// `total_tool_count` includes the health tool itself.
    pub fn new(
        server_name: impl Into<String>,
        version: impl Into<String>,
        total_tool_count: usize,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            version: version.into(),
            total_tool_count,
        }
    }
}

impl ToolRegistry for HealthTools {
    fn tools(&self) -> Vec<Tool> {
        vec![descriptor::<HealthParams>(
            HEALTH_TOOL,
            "Check server health: reports name, version and number of tools",
        )]
    }

    fn call<'a>(&'a self, name: &str, _args: Value) -> Option<ToolFuture<'a>> {
        if name != HEALTH_TOOL {
            return None;
        }
        Some(Box::pin(async move {
            to_payload(&HealthResponse {
                status: "healthy".to_string(),
                server_name: self.server_name.clone(),
                version: self.version.clone(),
                tool_count: self.total_tool_count,
            })
        }))
    }
}

impl Dispatcher {
    /// Registers the `health` tool; call after every other family.
    pub fn register_health(
        &mut self,
        server_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<(), ConfigError> {
        let total = self.tool_count() + 1;
        self.register(HealthTools::new(server_name, version, total))
    }
}
