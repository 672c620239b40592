//! Image generation tool implementation
//!
//! Generates one image through the image adapter and writes it to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rmcp::model::Tool;
use rmcp::{schemars, schemars::JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::adapters::gemini::{ImageApi, ImageRequest};
use crate::error::{ToolError, ToolResult};
use crate::mcp::registry::{ToolFuture, ToolRegistry, descriptor, require_non_empty, with_params};

/// Aspect ratios accepted by the image model.
pub const ASPECT_RATIOS: &[&str] = &[
    "1:1", "2:3", "3:2", "3:4", "4:3", "4:5", "5:4", "9:16", "16:9", "21:9",
];

const MODALITIES: &[&str] = &["TEXT", "IMAGE"];

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GenerateImageParams {
    #[schemars(description = "Text description of the image to generate")]
    pub prompt: String,
    #[schemars(description = "Directory to write the image to (defaults to the server's output directory)")]
    pub output_path: Option<String>,
    #[schemars(description = "File name; the extension is derived from the image type when omitted")]
    pub file_name: Option<String>,
    #[schemars(description = "Aspect ratio: 1:1, 2:3, 3:2, 3:4, 4:3, 4:5, 5:4, 9:16, 16:9 or 21:9")]
    pub size: Option<String>,
    #[schemars(description = "Response modalities, a subset of TEXT and IMAGE that includes IMAGE")]
    pub modalities: Option<Vec<String>>,
}

/// Image generation tools
pub struct ImageTools<A: ImageApi> {
    api: Arc<A>,
    output_dir: PathBuf,
}

impl<A: ImageApi> Clone for ImageTools<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            output_dir: self.output_dir.clone(),
        }
    }
}

fn check_size(size: Option<String>) -> ToolResult<Option<String>> {
    match size.map(|s| s.trim().to_string()) {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) if ASPECT_RATIOS.contains(&s.as_str()) => Ok(Some(s)),
        Some(s) => Err(ToolError::validation(format!(
            "size '{s}' is not one of {}",
            ASPECT_RATIOS.join(", ")
        ))),
    }
}

fn check_modalities(modalities: Option<Vec<String>>) -> ToolResult<Vec<String>> {
    let Some(requested) = modalities.filter(|m| !m.is_empty()) else {
        return Ok(MODALITIES.iter().map(|m| m.to_string()).collect());
    };

    let mut normalized: Vec<String> = Vec::new();
    for modality in requested {
        let upper = modality.trim().to_ascii_uppercase();
        if !MODALITIES.contains(&upper.as_str()) {
            return Err(ToolError::validation(format!(
                "modality '{modality}' is not one of TEXT, IMAGE"
            )));
        }
        if !normalized.contains(&upper) {
            normalized.push(upper);
        }
    }
    if !normalized.iter().any(|m| m == "IMAGE") {
        return Err(ToolError::validation("modalities must include IMAGE"));
    }
    Ok(normalized)
}

/// File extension for an image MIME type.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_guess::get_mime_extensions_str(mime_type) {
        Some(exts) if exts.contains(&"jpg") => "jpg",
        Some(exts) => exts.first().copied().unwrap_or("bin"),
        None => "bin",
    }
}

/// Sanitized requested file name; `None` when the caller left it empty.
fn check_file_name(requested: Option<&str>) -> ToolResult<Option<String>> {
    let Some(requested) = requested.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    let name = sanitize_filename::sanitize(requested);
    if name.trim_matches('.').is_empty() {
        return Err(ToolError::validation(format!(
            "file_name '{requested}' is not a usable file name"
        )));
    }
    Ok(Some(name))
}

/// Final file name: the checked name with an extension added when it has
/// none, or a timestamped default.
fn file_name_for(name: Option<String>, mime_type: &str) -> String {
    let ext = extension_for(mime_type);
    match name {
        None => format!("image-{}.{ext}", Utc::now().format("%Y%m%dT%H%M%S%3fZ")),
        Some(name) if Path::new(&name).extension().is_some() => name,
        Some(name) => format!("{name}.{ext}"),
    }
}

impl<A: ImageApi + 'static> ImageTools<A> {
    pub fn new(api: Arc<A>, output_dir: PathBuf) -> Self {
        Self { api, output_dir }
    }

    pub async fn generate_image(&self, params: GenerateImageParams) -> ToolResult<Value> {
        let prompt = require_non_empty("prompt", &params.prompt)?.to_string();
        let aspect_ratio = check_size(params.size)?;
        let modalities = check_modalities(params.modalities)?;
        let file_name = check_file_name(params.file_name.as_deref())?;
        let dir = params
            .output_path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.output_dir.clone());

        let image = self
            .api
            .generate_image(ImageRequest {
                prompt,
                aspect_ratio,
                modalities,
            })
            .await?;

        let path = dir.join(file_name_for(file_name, &image.mime_type));
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            ToolError::remote(None, format!("failed to create {}: {e}", dir.display()))
        })?;
        tokio::fs::write(&path, &image.bytes).await.map_err(|e| {
            ToolError::remote(None, format!("failed to write {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), bytes = image.bytes.len(), "image saved");

        Ok(json!({
            "file_path": path.display().to_string(),
            "mime_type": image.mime_type,
            "size_bytes": image.bytes.len(),
            "text": image.text,
            "model": image.model,
        }))
    }
}

impl<A: ImageApi + 'static> ToolRegistry for ImageTools<A> {
    fn tools(&self) -> Vec<Tool> {
        vec![descriptor::<GenerateImageParams>(
            "generate_image",
            "Generate an image from a text prompt and save it to a file.",
        )]
    }

    fn call<'a>(&'a self, name: &str, args: Value) -> Option<ToolFuture<'a>> {
        match name {
            "generate_image" => Some(with_params(args, move |p| self.generate_image(p))),
            _ => None,
        }
    }
}
