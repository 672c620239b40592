//! n8n workflow automation adapter.
//!
//! Talks to the n8n public REST API (`/api/v1`) with the `X-N8N-API-KEY`
//! header and reshapes workflows and executions into stable local types.
//! Workflow execution goes through the workflow's Webhook trigger, since the
//! public API has no direct "run" endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::http::{build_client, endpoint, read_json, read_text, transport_error};
use crate::config::N8nConfig;
use crate::error::{ToolError, ToolResult};

const API_KEY_HEADER: &str = "X-N8N-API-KEY";
const API_PREFIX: &str = "/api/v1";
pub const WEBHOOK_NODE_TYPE: &str = "n8n-nodes-base.webhook";

/// Filters for listing workflows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowFilter {
    pub active: Option<bool>,
    /// Comma-separated tag names.
    pub tags: Option<String>,
    pub name: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

/// Filters for listing executions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionFilter {
    pub workflow_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub tags: Vec<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPage {
    pub workflows: Vec<WorkflowSummary>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub summary: WorkflowSummary,
    pub nodes: Vec<NodeSummary>,
    pub connections: Value,
    pub settings: Value,
}

impl WorkflowDetail {
    /// Path of the first enabled Webhook trigger node, if any.
    pub fn webhook_path(&self) -> Option<&str> {
        self.nodes
            .iter()
            .filter(|n| !n.disabled)
            .find_map(|n| n.webhook_path.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub stopped_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPage {
    pub executions: Vec<Execution>,
    pub next_cursor: Option<String>,
}

/// Operations the workflow tools need from n8n.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    async fn list_workflows(&self, filter: WorkflowFilter) -> ToolResult<WorkflowPage>;

    async fn get_workflow(&self, id: &str) -> ToolResult<WorkflowDetail>;

    /// Activates or deactivates a workflow.
    async fn set_active(&self, id: &str, active: bool) -> ToolResult<WorkflowSummary>;

    /// POSTs `data` to the workflow webhook at `path`.
    async fn trigger_webhook(&self, path: &str, data: Value, test_mode: bool)
    -> ToolResult<Value>;

    async fn list_executions(&self, filter: ExecutionFilter) -> ToolResult<ExecutionPage>;

    async fn get_execution(&self, id: &str, include_data: bool) -> ToolResult<Execution>;
}

// -- wire shapes

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWorkflow {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    tags: Vec<RawTag>,
    created_at: Option<String>,
    updated_at: Option<String>,
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    connections: Value,
    #[serde(default)]
    settings: Value,
}

#[derive(Deserialize)]
struct RawTag {
    name: String,
}

#[derive(Deserialize)]
struct RawNode {
    name: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    parameters: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    next_cursor: Option<String>,
}

impl RawWorkflow {
    fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            active: self.active,
            tags: self.tags.iter().map(|t| t.name.clone()).collect(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }

    fn into_detail(self) -> WorkflowDetail {
        let summary = self.summary();
        let nodes = self
            .nodes
            .into_iter()
            .map(|node| {
                let webhook_path = (node.node_type == WEBHOOK_NODE_TYPE)
                    .then(|| node.parameters.get("path").and_then(Value::as_str))
                    .flatten()
                    .map(str::to_string);
                NodeSummary {
                    name: node.name,
                    node_type: node.node_type,
                    disabled: node.disabled,
                    webhook_path,
                }
            })
            .collect();
        WorkflowDetail {
            summary,
            nodes,
            connections: self.connections,
            settings: self.settings,
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn reshape<T: serde::de::DeserializeOwned>(value: Value) -> ToolResult<T> {
    serde_json::from_value(value)
        .map_err(|e| ToolError::remote(None, format!("unexpected n8n response shape: {e}")))
}

/// HTTP client for the n8n public API.
pub struct N8nClient {
    client: Client,
    /// Instance root, e.g. `http://localhost:5678`.
    instance_url: String,
    api_key: String,
}

impl N8nClient {
    /// Create a client from resolved configuration.
    ///
    /// Accepts either the instance root or the `/api/v1` URL.
    pub fn new(config: N8nConfig) -> ToolResult<Self> {
        let instance_url = config
            .base_url
            .trim_end_matches('/')
            .trim_end_matches(API_PREFIX)
            .to_string();
        Ok(Self {
            client: build_client(config.timeout, false)?,
            instance_url,
            api_key: config.api_key,
        })
    }

    fn api_url(&self, segments: &[&str]) -> ToolResult<reqwest::Url> {
        let mut all = vec!["api", "v1"];
        all.extend_from_slice(segments);
        endpoint(&self.instance_url, &all)
    }

    async fn get(&self, segments: &[&str], query: &[(&str, String)]) -> ToolResult<Value> {
        let url = self.api_url(segments)?;
        debug!(url = %url, "GET n8n");
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(e, &self.api_key))?;
        read_json(response, &self.api_key).await
    }

    async fn post(&self, segments: &[&str]) -> ToolResult<Value> {
        let url = self.api_url(segments)?;
        debug!(url = %url, "POST n8n");
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(e, &self.api_key))?;
        read_json(response, &self.api_key).await
    }
}

#[async_trait]
impl WorkflowApi for N8nClient {
    async fn list_workflows(&self, filter: WorkflowFilter) -> ToolResult<WorkflowPage> {
        let mut query = Vec::new();
        if let Some(active) = filter.active {
            query.push(("active", active.to_string()));
        }
        if let Some(tags) = filter.tags {
            query.push(("tags", tags));
        }
        if let Some(name) = filter.name {
            query.push(("name", name));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = filter.cursor {
            query.push(("cursor", cursor));
        }

        let page: RawPage<RawWorkflow> = reshape(self.get(&["workflows"], &query).await?)?;
        Ok(WorkflowPage {
            workflows: page.data.iter().map(RawWorkflow::summary).collect(),
            next_cursor: page.next_cursor,
        })
    }

    async fn get_workflow(&self, id: &str) -> ToolResult<WorkflowDetail> {
        let raw: RawWorkflow = reshape(self.get(&["workflows", id], &[]).await?)?;
        Ok(raw.into_detail())
    }

    async fn set_active(&self, id: &str, active: bool) -> ToolResult<WorkflowSummary> {
        let action = if active { "activate" } else { "deactivate" };
        let raw: RawWorkflow = reshape(self.post(&["workflows", id, action]).await?)?;
        info!(workflow_id = id, active = raw.active, "workflow {action}d");
        Ok(raw.summary())
    }

    async fn trigger_webhook(
        &self,
        path: &str,
        data: Value,
        test_mode: bool,
    ) -> ToolResult<Value> {
        let root = if test_mode { "webhook-test" } else { "webhook" };
        let mut segments = vec![root];
        segments.extend(path.trim_matches('/').split('/'));
        let url = endpoint(&self.instance_url, &segments)?;
        info!(url = %url, "triggering workflow webhook");

        let response = self
            .client
            .post(url)
            .json(&data)
            .send()
            .await
            .map_err(|e| transport_error(e, &self.api_key))?;
        let body = read_text(response, &self.api_key).await?;
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }

    async fn list_executions(&self, filter: ExecutionFilter) -> ToolResult<ExecutionPage> {
        let mut query = Vec::new();
        if let Some(workflow_id) = filter.workflow_id {
            query.push(("workflowId", workflow_id));
        }
        if let Some(status) = filter.status {
            query.push(("status", status));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = filter.cursor {
            query.push(("cursor", cursor));
        }

        let page: RawPage<Execution> = reshape(self.get(&["executions"], &query).await?)?;
        Ok(ExecutionPage {
            executions: page.data,
            next_cursor: page.next_cursor,
        })
    }

    async fn get_execution(&self, id: &str, include_data: bool) -> ToolResult<Execution> {
        let query = [("includeData", include_data.to_string())];
        let mut execution: Execution = reshape(self.get(&["executions", id], &query).await?)?;
        if !include_data {
            execution.data = None;
        }
        Ok(execution)
    }
}
