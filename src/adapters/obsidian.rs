//! Obsidian vault adapter.
//!
//! Talks to the Local REST API plugin using a bearer token. The plugin
//! serves a self-signed certificate, so TLS verification follows
//! `ObsidianConfig::verify_tls`.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Url};
use rmcp::{schemars, schemars::JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use super::http::{build_client, endpoint, read_json, read_text, transport_error};
use crate::config::ObsidianConfig;
use crate::error::{ToolError, ToolResult};

const MARKDOWN: &str = "text/markdown";

/// How patched content is merged into the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperation {
    Append,
    Prepend,
    Replace,
}

impl PatchOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::Replace => "replace",
        }
    }
}

/// What kind of anchor `PatchRequest::target` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Heading,
    Block,
    Frontmatter,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Block => "block",
            Self::Frontmatter => "frontmatter",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchRequest {
    pub path: String,
    pub operation: PatchOperation,
    pub target_type: TargetType,
    /// Heading path (`Top::Sub`), block id, or frontmatter key.
    pub target: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub filename: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub matches: Vec<SearchMatch>,
}

/// Operations the vault tools need from Obsidian.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Lists a directory; the vault root when `directory` is `None`.
    /// Subdirectories end with `/`.
    async fn list_files(&self, directory: Option<String>) -> ToolResult<Vec<String>>;

    async fn get_file(&self, path: &str) -> ToolResult<String>;

    async fn search(&self, query: &str, context_length: u32) -> ToolResult<Vec<SearchResult>>;

    async fn patch_content(&self, request: PatchRequest) -> ToolResult<()>;

    /// Appends to a file, creating it when missing.
    async fn append_content(&self, path: &str, content: &str) -> ToolResult<()>;
}

/// Rejects absolute paths and `..` segments, returning the trimmed path.
pub fn validate_vault_path(path: &str) -> ToolResult<&str> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(ToolError::validation("path must not be empty"));
    }
    if trimmed.starts_with('/') || trimmed.starts_with('\\') || trimmed.contains(':') {
        return Err(ToolError::validation(format!(
            "path '{trimmed}' must be relative to the vault root"
        )));
    }
    if trimmed.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ToolError::validation(format!(
            "path '{trimmed}' must not contain '..' segments"
        )));
    }
    Ok(trimmed)
}

/// Percent-encodes a patch target for use as a header value.
fn encode_target(target: &str) -> String {
    let mut encoded = String::with_capacity(target.len());
    for byte in target.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.~:#^ ".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

#[derive(Deserialize)]
struct FileListing {
    #[serde(default)]
    files: Vec<String>,
}

/// HTTP client for the Local REST API plugin.
pub struct ObsidianClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ObsidianClient {
    pub fn new(config: ObsidianConfig) -> ToolResult<Self> {
        Ok(Self {
            client: build_client(config.timeout, !config.verify_tls)?,
            base_url: config.base_url,
            api_key: config.api_key,
        })
    }

    fn vault_url(&self, path: &str, directory: bool) -> ToolResult<Url> {
        let mut segments = vec!["vault"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        if directory {
            segments.push("");
        }
        endpoint(&self.base_url, &segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, url = %url, "Obsidian request");
        self.client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    async fn send(&self, builder: RequestBuilder) -> ToolResult<String> {
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, &self.api_key))?;
        read_text(response, &self.api_key).await
    }
}

#[async_trait]
impl VaultApi for ObsidianClient {
    async fn list_files(&self, directory: Option<String>) -> ToolResult<Vec<String>> {
        let dir = match directory.as_deref() {
            Some(dir) => validate_vault_path(dir)?,
            None => "",
        };
        let url = self.vault_url(dir, true)?;
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| transport_error(e, &self.api_key))?;
        let listing: FileListing = serde_json::from_value(read_json(response, &self.api_key).await?)
            .map_err(|e| ToolError::remote(None, format!("unexpected listing shape: {e}")))?;
        Ok(listing.files)
    }

    async fn get_file(&self, path: &str) -> ToolResult<String> {
        let url = self.vault_url(validate_vault_path(path)?, false)?;
        self.send(self.request(Method::GET, url).header("Accept", MARKDOWN))
            .await
    }

    async fn search(&self, query: &str, context_length: u32) -> ToolResult<Vec<SearchResult>> {
        let url = endpoint(&self.base_url, &["search", "simple", ""])?;
        let body = self
            .send(self.request(Method::POST, url).query(&[
                ("query", query.to_string()),
                ("contextLength", context_length.to_string()),
            ]))
            .await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let results: Vec<SearchResult> = serde_json::from_str::<Value>(&body)
            .and_then(serde_json::from_value)
            .map_err(|e| ToolError::remote(None, format!("unexpected search response: {e}")))?;
        Ok(results)
    }

    async fn patch_content(&self, request: PatchRequest) -> ToolResult<()> {
        let url = self.vault_url(validate_vault_path(&request.path)?, false)?;
        self.send(
            self.request(Method::PATCH, url)
                .header("Operation", request.operation.as_str())
                .header("Target-Type", request.target_type.as_str())
                .header("Target", encode_target(&request.target))
                .header(CONTENT_TYPE, MARKDOWN)
                .body(request.content),
        )
        .await?;
        info!(
            path = %request.path,
            operation = request.operation.as_str(),
            target_type = request.target_type.as_str(),
            "vault file patched"
        );
        Ok(())
    }

    async fn append_content(&self, path: &str, content: &str) -> ToolResult<()> {
        let url = self.vault_url(validate_vault_path(path)?, false)?;
        self.send(
            self.request(Method::POST, url)
                .header(CONTENT_TYPE, MARKDOWN)
                .body(content.to_string()),
        )
        .await?;
        info!(path, bytes = content.len(), "vault file appended");
        Ok(())
    }
}
