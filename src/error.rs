//! Error taxonomy shared by every adapter server.
//!
//! Configuration errors are fatal at startup. Everything else is surfaced
//! per invocation as a structured failure result and never escapes the
//! dispatcher.

use miette::Diagnostic;
use rmcp::model::{CallToolResult, Content};
use serde_json::{Value, json};
use thiserror::Error;

/// Configuration resolution errors.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {name}")]
    #[diagnostic(
        code(mcp_adapters::config::missing_var),
        help("Set {name} in the environment of the MCP host before starting the server.")
    )]
    MissingVar { name: String },

    #[error("Invalid value for environment variable {name}: {message}")]
    #[diagnostic(code(mcp_adapters::config::invalid_var))]
    InvalidVar { name: String, message: String },

    #[error("Tool '{name}' is registered more than once")]
    #[diagnostic(code(mcp_adapters::config::duplicate_tool))]
    DuplicateTool { name: String },
}

/// Errors produced while handling a single tool invocation.
#[derive(Error, Diagnostic, Debug)]
pub enum ToolError {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(mcp_adapters::configuration))]
    Configuration(#[from] ConfigError),

    #[error("Invalid parameters: {message}")]
    #[diagnostic(code(mcp_adapters::validation))]
    Validation { message: String },

    #[error("Authentication failed")]
    #[diagnostic(
        code(mcp_adapters::authentication),
        help("Check the API key or database credentials configured for this server.")
    )]
    Authentication,

    #[error("Not found: {message}")]
    #[diagnostic(code(mcp_adapters::not_found))]
    NotFound { message: String },

    #[error("{}", remote_message(.status, .message))]
    #[diagnostic(code(mcp_adapters::remote))]
    Remote {
        status: Option<u16>,
        message: String,
    },

    #[error("Unknown tool: {name}")]
    #[diagnostic(code(mcp_adapters::unknown_tool))]
    UnknownTool { name: String },
}

fn remote_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("Remote error ({status}): {message}"),
        None => format!("Remote error: {message}"),
    }
}

/// Result type for adapter calls and tool functions.
pub type ToolResult<T> = Result<T, ToolError>;

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the failure envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Validation { .. } => "validation_error",
            Self::Authentication => "authentication_error",
            Self::NotFound { .. } => "not_found",
            Self::Remote { .. } => "remote_error",
            Self::UnknownTool { .. } => "unknown_tool",
        }
    }

    /// Upstream HTTP status, when the failure came from a remote API.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => *status,
            _ => None,
        }
    }
}

/// Builds the success envelope: `{"success": true, "data": ...}`.
pub fn success_result(payload: Value) -> CallToolResult {
    let body = json!({ "success": true, "data": payload });
    CallToolResult::success(vec![Content::text(pretty(&body))])
}

/// Builds the failure envelope. Debug details are attached only on request.
pub fn failure_result(err: &ToolError, debug: bool) -> CallToolResult {
    let mut body = json!({
        "success": false,
        "error": err.to_string(),
        "code": err.code(),
    });
    if let Some(status) = err.status() {
        body["status"] = json!(status);
    }
    if debug {
        body["details"] = json!(format!("{err:?}"));
    }
    CallToolResult::error(vec![Content::text(pretty(&body))])
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::RawContent;

    fn text_of(result: &CallToolResult) -> Value {
        match &result.content[0].raw {
            RawContent::Text(text) => serde_json::from_str(&text.text).unwrap(),
            _ => panic!("Expected text content"),
        }
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            ToolError::Configuration(ConfigError::MissingVar {
                name: "X".to_string(),
            }),
            ToolError::validation("bad"),
            ToolError::Authentication,
            ToolError::not_found("gone"),
            ToolError::remote(Some(500), "boom"),
            ToolError::UnknownTool {
                name: "nope".to_string(),
            },
        ];
        let mut codes: Vec<_> = errors.iter().map(ToolError::code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_authentication_message() {
        assert_eq!(ToolError::Authentication.to_string(), "Authentication failed");
    }

    #[test]
    fn test_remote_message_includes_status() {
        let err = ToolError::remote(Some(502), "bad gateway");
        assert_eq!(err.to_string(), "Remote error (502): bad gateway");
        assert_eq!(err.status(), Some(502));

        let err = ToolError::remote(None, "timed out");
        assert_eq!(err.to_string(), "Remote error: timed out");
    }

    #[test]
    fn test_missing_var_names_variable() {
        let err = ConfigError::MissingVar {
            name: "N8N_API_KEY".to_string(),
        };
        assert!(err.to_string().contains("N8N_API_KEY"));
    }

    #[test]
    fn test_success_envelope() {
        let result = success_result(json!({"id": "1"}));
        assert_eq!(result.is_error, Some(false));
        let body = text_of(&result);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], "1");
    }

    #[test]
    fn test_failure_envelope_without_debug() {
        let result = failure_result(&ToolError::validation("missing field `id`"), false);
        assert_eq!(result.is_error, Some(true));
        let body = text_of(&result);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "validation_error");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_failure_envelope_with_debug() {
        let result = failure_result(&ToolError::remote(Some(500), "boom"), true);
        let body = text_of(&result);
        assert_eq!(body["status"], 500);
        assert!(body["details"].as_str().unwrap().contains("Remote"));
    }
}
