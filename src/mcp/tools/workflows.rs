//! Workflow tool implementations
//!
//! Handles the n8n workflow and execution tools.

use std::sync::Arc;

use rmcp::model::Tool;
use rmcp::{schemars, schemars::JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::check_limit;
use crate::adapters::n8n::{ExecutionFilter, WorkflowApi, WorkflowFilter};
use crate::error::{ToolError, ToolResult};
use crate::mcp::registry::{
    ToolFuture, ToolRegistry, descriptor, require_non_empty, to_payload, with_params,
};

const MAX_PAGE: u32 = 250;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListWorkflowsParams {
    #[schemars(description = "Only active (true) or inactive (false) workflows")]
    pub active: Option<bool>,
    #[schemars(description = "Only workflows carrying all of these tag names")]
    pub tags: Option<Vec<String>>,
    #[schemars(description = "Filter by workflow name")]
    pub name: Option<String>,
    #[schemars(description = "Page size (1-250, default 100)")]
    pub limit: Option<u32>,
    #[schemars(description = "Cursor from a previous page's nextCursor")]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowIdParams {
    #[schemars(description = "Workflow ID")]
    pub workflow_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteWorkflowParams {
    #[schemars(description = "Workflow ID; the workflow must start with a Webhook trigger node")]
    pub workflow_id: String,
    #[schemars(description = "JSON object posted to the webhook")]
    pub data: Option<Value>,
    #[schemars(
        description = "Use the test webhook URL (workflow open in the editor, listening for a test event)"
    )]
    pub test_mode: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
    Waiting,
    Running,
    Canceled,
}

impl ExecutionStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListExecutionsParams {
    #[schemars(description = "Only executions of this workflow")]
    pub workflow_id: Option<String>,
    #[schemars(description = "Filter by status (success, error, waiting, running, canceled)")]
    pub status: Option<ExecutionStatus>,
    #[schemars(description = "Page size (1-250, default 100)")]
    pub limit: Option<u32>,
    #[schemars(description = "Cursor from a previous page's nextCursor")]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetExecutionParams {
    #[schemars(description = "Execution ID")]
    pub execution_id: String,
    #[schemars(description = "Include the full run data (can be large, default false)")]
    pub include_data: Option<bool>,
}

/// n8n workflow tools
///
/// Generic over `A: WorkflowApi` so tests can substitute a mock.
pub struct WorkflowTools<A: WorkflowApi> {
    api: Arc<A>,
}

impl<A: WorkflowApi> Clone for WorkflowTools<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
        }
    }
}

impl<A: WorkflowApi + 'static> WorkflowTools<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    pub async fn list_workflows(&self, params: ListWorkflowsParams) -> ToolResult<Value> {
        let filter = WorkflowFilter {
            active: params.active,
            tags: params
                .tags
                .filter(|tags| !tags.is_empty())
                .map(|tags| tags.join(",")),
            name: params.name,
            limit: check_limit(params.limit, MAX_PAGE)?,
            cursor: params.cursor,
        };
        to_payload(&self.api.list_workflows(filter).await?)
    }

    pub async fn get_workflow(&self, params: WorkflowIdParams) -> ToolResult<Value> {
        let id = require_non_empty("workflow_id", &params.workflow_id)?;
        to_payload(&self.api.get_workflow(id).await?)
    }

    pub async fn activate_workflow(&self, params: WorkflowIdParams) -> ToolResult<Value> {
        self.set_active(params, true).await
    }

    pub async fn deactivate_workflow(&self, params: WorkflowIdParams) -> ToolResult<Value> {
        self.set_active(params, false).await
    }

    async fn set_active(&self, params: WorkflowIdParams, active: bool) -> ToolResult<Value> {
        let id = require_non_empty("workflow_id", &params.workflow_id)?;
        let summary = self.api.set_active(id, active).await?;
        Ok(json!({
            "id": summary.id,
            "name": summary.name,
            "active": summary.active,
        }))
    }

    pub async fn execute_workflow(&self, params: ExecuteWorkflowParams) -> ToolResult<Value> {
        let id = require_non_empty("workflow_id", &params.workflow_id)?;
        let data = match params.data {
            None | Some(Value::Null) => json!({}),
            Some(data @ Value::Object(_)) => data,
            Some(_) => return Err(ToolError::validation("data must be a JSON object")),
        };
        let test_mode = params.test_mode.unwrap_or(false);

        let workflow = self.api.get_workflow(id).await?;
        let path = workflow.webhook_path().ok_or_else(|| {
            ToolError::not_found(format!(
                "workflow '{id}' has no enabled Webhook trigger node"
            ))
        })?;
        if !test_mode && !workflow.summary.active {
            return Err(ToolError::validation(format!(
                "workflow '{id}' is inactive; activate it or set test_mode"
            )));
        }

        info!(workflow_id = id, test_mode, "executing workflow via webhook");
        let response = self.api.trigger_webhook(path, data, test_mode).await?;
        Ok(json!({
            "workflow_id": id,
            "webhook_path": path,
            "test_mode": test_mode,
            "response": response,
        }))
    }

    pub async fn list_executions(&self, params: ListExecutionsParams) -> ToolResult<Value> {
        let filter = ExecutionFilter {
            workflow_id: params.workflow_id.filter(|id| !id.trim().is_empty()),
            status: params.status.map(|s| s.as_str().to_string()),
            limit: check_limit(params.limit, MAX_PAGE)?,
            cursor: params.cursor,
        };
        to_payload(&self.api.list_executions(filter).await?)
    }

    pub async fn get_execution(&self, params: GetExecutionParams) -> ToolResult<Value> {
        let id = require_non_empty("execution_id", &params.execution_id)?;
        let execution = self
            .api
            .get_execution(id, params.include_data.unwrap_or(false))
            .await?;
        to_payload(&execution)
    }
}

impl<A: WorkflowApi + 'static> ToolRegistry for WorkflowTools<A> {
    fn tools(&self) -> Vec<Tool> {
        vec![
            descriptor::<ListWorkflowsParams>(
                "list_workflows",
                "List workflows with optional active/tag/name filters and cursor pagination.",
            ),
            descriptor::<WorkflowIdParams>(
                "get_workflow",
                "Get a workflow with its nodes, connections, settings and tags.",
            ),
            descriptor::<WorkflowIdParams>(
                "activate_workflow",
                "Activate a workflow so its triggers run in production.",
            ),
            descriptor::<WorkflowIdParams>(
                "deactivate_workflow",
                "Deactivate a workflow, stopping its production triggers.",
            ),
            descriptor::<ExecuteWorkflowParams>(
                "execute_workflow",
                "Run a workflow by posting data to its Webhook trigger.",
            ),
            descriptor::<ListExecutionsParams>(
                "list_executions",
                "List workflow executions filtered by workflow or status.",
            ),
            descriptor::<GetExecutionParams>(
                "get_execution",
                "Get one execution, optionally with its full run data.",
            ),
        ]
    }

    fn call<'a>(&'a self, name: &str, args: Value) -> Option<ToolFuture<'a>> {
        let future = match name {
            "list_workflows" => with_params(args, move |p| self.list_workflows(p)),
            "get_workflow" => with_params(args, move |p| self.get_workflow(p)),
            "activate_workflow" => with_params(args, move |p| self.activate_workflow(p)),
            "deactivate_workflow" => with_params(args, move |p| self.deactivate_workflow(p)),
            "execute_workflow" => with_params(args, move |p| self.execute_workflow(p)),
            "list_executions" => with_params(args, move |p| self.list_executions(p)),
            "get_execution" => with_params(args, move |p| self.get_execution(p)),
            _ => return None,
        };
        Some(future)
    }
}
