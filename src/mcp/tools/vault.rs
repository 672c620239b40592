//! Vault tool implementations
//!
//! Handles the Obsidian note tools: listing, reading, searching and editing
//! files in the vault.

use std::sync::Arc;

use futures_util::future::join_all;
use rmcp::model::Tool;
use rmcp::{schemars, schemars::JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::adapters::obsidian::{
    PatchOperation, PatchRequest, TargetType, VaultApi, validate_vault_path,
};
use crate::error::{ToolError, ToolResult};
use crate::mcp::registry::{
    ToolFuture, ToolRegistry, descriptor, require_non_empty, with_params,
};

const DEFAULT_CONTEXT_LENGTH: u32 = 100;
const MAX_CONTEXT_LENGTH: u32 = 10_000;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListFilesParams {
    #[schemars(description = "Directory relative to the vault root (omit for the root)")]
    pub directory: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FilePathParams {
    #[schemars(description = "File path relative to the vault root")]
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchParams {
    #[schemars(description = "Text to search for across the vault")]
    pub query: String,
    #[schemars(description = "Characters of context around each match (default 100)")]
    pub context_length: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PatchContentParams {
    #[schemars(description = "File path relative to the vault root")]
    pub path: String,
    #[schemars(description = "append, prepend or replace")]
    pub operation: PatchOperation,
    #[schemars(description = "heading, block or frontmatter")]
    pub target_type: TargetType,
    #[schemars(description = "Heading path (e.g. 'Tasks::Today'), block reference id, or frontmatter field")]
    pub target: String,
    #[schemars(description = "Content to insert")]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AppendContentParams {
    #[schemars(description = "File path relative to the vault root; created when missing")]
    pub path: String,
    #[schemars(description = "Content to append")]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BatchGetParams {
    #[schemars(description = "File paths relative to the vault root")]
    pub paths: Vec<String>,
}

/// Obsidian vault tools
pub struct VaultTools<V: VaultApi> {
    vault: Arc<V>,
}

impl<V: VaultApi> Clone for VaultTools<V> {
    fn clone(&self) -> Self {
        Self {
            vault: Arc::clone(&self.vault),
        }
    }
}

impl<V: VaultApi + 'static> VaultTools<V> {
    pub fn new(vault: Arc<V>) -> Self {
        Self { vault }
    }

    pub async fn list_files(&self, params: ListFilesParams) -> ToolResult<Value> {
        let directory = match params.directory.as_deref().map(|d| d.trim().trim_end_matches('/')) {
            None | Some("") => None,
            Some(dir) => Some(validate_vault_path(dir)?.to_string()),
        };
        let files = self.vault.list_files(directory.clone()).await?;
        Ok(json!({
            "directory": directory.unwrap_or_else(|| "/".to_string()),
            "files": files,
        }))
    }

    pub async fn get_file_contents(&self, params: FilePathParams) -> ToolResult<Value> {
        let path = validate_vault_path(&params.path)?;
        let content = self.vault.get_file(path).await?;
        Ok(json!({ "path": path, "content": content }))
    }

    pub async fn search(&self, params: SearchParams) -> ToolResult<Value> {
        let query = require_non_empty("query", &params.query)?;
        let context_length = match params.context_length {
            None => DEFAULT_CONTEXT_LENGTH,
            Some(n) if n > MAX_CONTEXT_LENGTH => {
                return Err(ToolError::validation(format!(
                    "context_length must be at most {MAX_CONTEXT_LENGTH}"
                )));
            }
            Some(n) => n,
        };
        let results = self.vault.search(query, context_length).await?;
        Ok(json!({ "query": query, "results": results }))
    }

    pub async fn patch_content(&self, params: PatchContentParams) -> ToolResult<Value> {
        let path = validate_vault_path(&params.path)?.to_string();
        let target = require_non_empty("target", &params.target)?.to_string();
        self.vault
            .patch_content(PatchRequest {
                path: path.clone(),
                operation: params.operation,
                target_type: params.target_type,
                target: target.clone(),
                content: params.content,
            })
            .await?;
        Ok(json!({
            "path": path,
            "operation": params.operation.as_str(),
            "target_type": params.target_type.as_str(),
            "target": target,
        }))
    }

    pub async fn append_content(&self, params: AppendContentParams) -> ToolResult<Value> {
        let path = validate_vault_path(&params.path)?;
        self.vault.append_content(path, &params.content).await?;
        Ok(json!({ "path": path, "appended_bytes": params.content.len() }))
    }

    /// Reads several files. A failure on one file becomes an error entry for
    /// that file instead of failing the batch.
    pub async fn batch_get_file_contents(&self, params: BatchGetParams) -> ToolResult<Value> {
        if params.paths.is_empty() {
            return Err(ToolError::validation("paths must not be empty"));
        }

        let reads = params.paths.iter().map(|raw| async move {
            let path = validate_vault_path(raw)?;
            self.vault.get_file(path).await.map(|content| (path, content))
        });
        let entries: Vec<Value> = join_all(reads)
            .await
            .into_iter()
            .zip(&params.paths)
            .map(|(result, raw)| match result {
                Ok((path, content)) => json!({ "path": path, "content": content }),
                Err(err) => json!({
                    "path": raw,
                    "error": err.to_string(),
                    "code": err.code(),
                }),
            })
            .collect();
        Ok(json!({ "files": entries }))
    }
}

impl<V: VaultApi + 'static> ToolRegistry for VaultTools<V> {
    fn tools(&self) -> Vec<Tool> {
        vec![
            descriptor::<ListFilesParams>(
                "list_files",
                "List files in the vault root or in one directory.",
            ),
            descriptor::<FilePathParams>(
                "get_file_contents",
                "Return the markdown content of a single vault file.",
            ),
            descriptor::<SearchParams>(
                "search",
                "Search the vault for text and return matching files with context.",
            ),
            descriptor::<PatchContentParams>(
                "patch_content",
                "Insert content relative to a heading, block reference or frontmatter field.",
            ),
            descriptor::<AppendContentParams>(
                "append_content",
                "Append content to a file, creating it if it does not exist.",
            ),
            descriptor::<BatchGetParams>(
                "batch_get_file_contents",
                "Return the contents of several files; unreadable files get an error entry.",
            ),
        ]
    }

    fn call<'a>(&'a self, name: &str, args: Value) -> Option<ToolFuture<'a>> {
        let future = match name {
            "list_files" => with_params(args, move |p| self.list_files(p)),
            "get_file_contents" => with_params(args, move |p| self.get_file_contents(p)),
            "search" => with_params(args, move |p| self.search(p)),
            "patch_content" => with_params(args, move |p| self.patch_content(p)),
            "append_content" => with_params(args, move |p| self.append_content(p)),
            "batch_get_file_contents" => {
                with_params(args, move |p| self.batch_get_file_contents(p))
            }
            _ => return None,
        };
        Some(future)
    }
}
