//! Tests for the tool registry and dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rmcp::model::Tool;
use rmcp::{schemars, schemars::JsonSchema};
use serde::Deserialize;
use serde_json::{Value, json};

use super::registry::*;
use crate::error::{ConfigError, ToolError};

#[derive(Debug, Deserialize, JsonSchema)]
struct EchoParams {
    #[schemars(description = "Text to echo")]
    text: String,
    #[allow(dead_code)]
    repeat: Option<u32>,
}

/// Test family: `echo` returns its input, `boom` panics.
struct EchoTools {
    calls: Arc<AtomicUsize>,
}

impl ToolRegistry for EchoTools {
    fn tools(&self) -> Vec<Tool> {
        vec![
            descriptor::<EchoParams>("echo", "Echo text back"),
            descriptor::<EchoParams>("boom", "Always panics"),
        ]
    }

    fn call<'a>(&'a self, name: &str, args: Value) -> Option<ToolFuture<'a>> {
        match name {
            "echo" => Some(Box::pin(async move {
                let params: EchoParams = parse_params(args)?;
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ToolError>(json!({ "text": params.text, "in_request": in_request() }))
            })),
            "boom" => Some(Box::pin(async move {
                if self.calls.load(Ordering::SeqCst) < usize::MAX {
                    panic!("kaboom");
                }
                Ok::<_, ToolError>(Value::Null)
            })),
            _ => None,
        }
    }
}

struct OtherEcho;

impl ToolRegistry for OtherEcho {
    fn tools(&self) -> Vec<Tool> {
        vec![descriptor::<EchoParams>("echo", "Conflicting echo")]
    }

    fn call<'a>(&'a self, _name: &str, _args: Value) -> Option<ToolFuture<'a>> {
        None
    }
}

fn dispatcher() -> (Dispatcher, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = Dispatcher::new()
        .with(EchoTools {
            calls: Arc::clone(&calls),
        })
        .unwrap();
    (dispatcher, calls)
}

#[test]
fn test_descriptor_schema_marks_required_fields() {
    let tool = descriptor::<EchoParams>("echo", "Echo text back");
    assert_eq!(tool.name, "echo");
    let schema = Value::Object((*tool.input_schema).clone());
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["required"], json!(["text"]));
    assert_eq!(schema["properties"]["text"]["description"], "Text to echo");
}

#[test]
fn test_duplicate_names_are_rejected() {
    let (mut dispatcher, _) = dispatcher();
    let err = dispatcher.register(OtherEcho).unwrap_err();
    assert_eq!(
        err,
        ConfigError::DuplicateTool {
            name: "echo".to_string()
        }
    );
    assert_eq!(dispatcher.tool_count(), 2);
}

#[tokio::test]
async fn test_dispatch_routes_by_exact_name() {
    let (dispatcher, calls) = dispatcher();
    let value = dispatcher
        .dispatch("echo", json!({"text": "hi"}))
        .await
        .unwrap();
    assert_eq!(value["text"], "hi");
    assert_eq!(value["in_request"], true);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let err = dispatcher.dispatch("Echo", json!({"text": "hi"})).await.unwrap_err();
    assert!(matches!(err, ToolError::UnknownTool { ref name } if name == "Echo"));
}

#[tokio::test]
async fn test_invalid_params_are_validation_errors() {
    let (dispatcher, calls) = dispatcher();
    for args in [json!({}), json!({"text": 5}), Value::Null] {
        let err = dispatcher.dispatch("echo", args).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation { .. }));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_panicking_tool_becomes_failure() {
    let (dispatcher, _) = dispatcher();
    let err = dispatcher.dispatch("boom", json!({})).await.unwrap_err();
    match err {
        ToolError::Remote { message, .. } => assert!(message.contains("kaboom")),
        other => panic!("Expected remote error, got {other:?}"),
    }

    // The dispatcher keeps serving after a panic.
    assert!(dispatcher.dispatch("echo", json!({"text": "still here"})).await.is_ok());
}

#[test]
fn test_in_request_is_false_outside_dispatch() {
    assert!(!in_request());
}

#[test]
fn test_register_health_counts_itself() {
    let (mut dispatcher, _) = dispatcher();
    dispatcher.register_health("test", "0.0.0").unwrap();
    assert_eq!(dispatcher.tool_count(), 3);
    assert!(dispatcher.has_tool("health"));
}

#[test]
fn test_require_non_empty() {
    assert_eq!(require_non_empty("id", " 42 ").unwrap(), "42");
    assert!(require_non_empty("id", "  ").is_err());
}
