//! Tool registry and dispatcher.
//!
//! Each tool family implements [`ToolRegistry`]. The [`Dispatcher`] owns the
//! registries of one server, enforces name uniqueness at registration, and
//! routes calls by exact name. Panics inside a tool are caught and turned
//! into a failure so the server keeps serving.
//!
//! Routing is by hand rather than through rmcp's `#[tool_router]` so that
//! families can be combined at runtime (every server adds `health` to its
//! family), a name collision is a startup error instead of a silent
//! override, and an unknown name gets its own error code. Descriptors still
//! come from `schemars` on the parameter structs, so listed schemas match
//! what [`with_params`] accepts.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use rmcp::model::Tool;
use rmcp::schemars::{JsonSchema, schema_for};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::{ConfigError, ToolError, ToolResult};

/// Future returned by a tool call.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolResult<Value>> + Send + 'a>>;

tokio::task_local! {
    static IN_REQUEST: ();
}

/// True while a tool invocation is running on the current task.
pub fn in_request() -> bool {
    IN_REQUEST.try_with(|_| ()).is_ok()
}

/// A family of tools.
pub trait ToolRegistry: Send + Sync {
    fn tools(&self) -> Vec<Tool>;

    /// Starts a call. Returns `None` when `name` does not belong to this registry.
    fn call<'a>(&'a self, name: &str, args: Value) -> Option<ToolFuture<'a>>;

    fn tool_count(&self) -> usize {
        self.tools().len()
    }

    fn has_tool(&self, name: &str) -> bool {
        self.tools().iter().any(|t| t.name == name)
    }
}

/// Input schema for a parameter struct.
pub fn schema_of<P: JsonSchema>() -> Arc<Map<String, Value>> {
    match serde_json::to_value(schema_for!(P)) {
        Ok(Value::Object(map)) => Arc::new(map),
        _ => Arc::new(Map::new()),
    }
}

/// Builds a tool descriptor whose schema comes from `P`.
pub fn descriptor<P: JsonSchema>(name: &'static str, description: &'static str) -> Tool {
    Tool::new(name, description, schema_of::<P>())
}

/// Parses call arguments, mapping any mismatch to a validation error.
///
/// Missing arguments are treated as an empty object.
pub fn parse_params<P: DeserializeOwned>(args: Value) -> ToolResult<P> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| ToolError::validation(e.to_string()))
}

/// Parses `args` into `P` and starts `handler`.
///
/// A parse failure yields a ready validation error without running the
/// handler, so adapters are never touched with malformed input.
pub fn with_params<'a, P, Fut>(args: Value, handler: impl FnOnce(P) -> Fut) -> ToolFuture<'a>
where
    P: DeserializeOwned,
    Fut: Future<Output = ToolResult<Value>> + Send + 'a,
{
    match parse_params(args) {
        Ok(params) => Box::pin(handler(params)),
        Err(err) => Box::pin(std::future::ready(Err(err))),
    }
}

/// Serializes a tool payload.
pub fn to_payload<T: Serialize>(value: &T) -> ToolResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| ToolError::remote(None, format!("failed to encode result: {e}")))
}

/// Requires a non-blank string parameter.
pub fn require_non_empty<'a>(field: &str, value: &'a str) -> ToolResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ToolError::validation(format!("{field} must not be empty")))
    } else {
        Ok(trimmed)
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Routes tool calls to the registry that declared the tool.
#[derive(Default)]
pub struct Dispatcher {
    registries: Vec<Box<dyn ToolRegistry>>,
    routes: HashMap<String, usize>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registry. Fails if any of its tool names is already taken.
    pub fn register<R: ToolRegistry + 'static>(&mut self, registry: R) -> Result<(), ConfigError> {
        let tools = registry.tools();
        let mut incoming = HashMap::new();
        for tool in &tools {
            let name = tool.name.to_string();
            if self.routes.contains_key(&name) || incoming.contains_key(&name) {
                return Err(ConfigError::DuplicateTool { name });
            }
            incoming.insert(name, self.registries.len());
        }
        debug!(tools = tools.len(), "registered tool family");
        self.routes.extend(incoming);
        self.registries.push(Box::new(registry));
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<R: ToolRegistry + 'static>(mut self, registry: R) -> Result<Self, ConfigError> {
        self.register(registry)?;
        Ok(self)
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.registries.iter().flat_map(|r| r.tools()).collect()
    }

    pub fn tool_count(&self) -> usize {
        self.routes.len()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Runs the tool named `name`. Matching is exact and case-sensitive.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolResult<Value> {
        let unknown = || ToolError::UnknownTool {
            name: name.to_string(),
        };
        let index = *self.routes.get(name).ok_or_else(unknown)?;
        let future = self
            .registries
            .get(index)
            .and_then(|registry| registry.call(name, args))
            .ok_or_else(unknown)?;

        match IN_REQUEST
            .scope((), AssertUnwindSafe(future).catch_unwind())
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(tool = name, panic = %message, "tool panicked");
                Err(ToolError::remote(
                    None,
                    format!("tool '{name}' failed unexpectedly: {message}"),
                ))
            }
        }
    }
}
