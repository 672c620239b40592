//! MCP server handler.
//!
//! Delegates `tools/list` and `tools/call` to a [`Dispatcher`] and wraps every
//! outcome in the success or failure envelope. Tool failures are returned as
//! results with `isError: true`; they never surface as protocol errors.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, ListToolsResult, PaginatedRequestParams,
        ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::registry::Dispatcher;
use crate::error::{failure_result, success_result};

/// One adapter server: a dispatcher plus the text advertised at `initialize`.
#[derive(Clone)]
pub struct AdapterServer {
    dispatcher: Arc<Dispatcher>,
    instructions: String,
    debug: bool,
}

impl AdapterServer {
    /// `debug` attaches error details to failure envelopes.
    pub fn new(dispatcher: Dispatcher, instructions: impl Into<String>, debug: bool) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            instructions: instructions.into(),
            debug,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.dispatcher.tools()
    }

    /// Runs one tool call and builds its envelope.
    pub async fn invoke(&self, name: &str, arguments: Option<Map<String, Value>>) -> CallToolResult {
        let args = Value::Object(arguments.unwrap_or_default());
        debug!(tool = name, "tool call");
        match self.dispatcher.dispatch(name, args).await {
            Ok(payload) => success_result(payload),
            Err(err) => {
                warn!(tool = name, code = err.code(), error = %err, "tool call failed");
                failure_result(&err, self.debug)
            }
        }
    }
}

impl ServerHandler for AdapterServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_instructions(self.instructions.clone())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.invoke(&request.name, request.arguments).await)
    }
}
