//! Gemini image generation adapter.
//!
//! Calls `models/{model}:generateContent` with the `x-goog-api-key` header
//! and extracts the first inline image part from the response.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use super::http::{build_client, endpoint, read_json, transport_error};
use crate::config::GeminiConfig;
use crate::error::{ToolError, ToolResult};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// A single image generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    /// Aspect ratio such as `16:9`; the model default when `None`.
    pub aspect_ratio: Option<String>,
    /// Upper-case response modalities, e.g. `["TEXT", "IMAGE"]`.
    pub modalities: Vec<String>,
}

/// Decoded image returned by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Any text parts the model returned alongside the image.
    pub text: Option<String>,
    pub model: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn generate_image(&self, request: ImageRequest) -> ToolResult<GeneratedImage>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

/// Builds the `generateContent` request body.
fn request_body(request: &ImageRequest) -> Value {
    let mut generation_config = json!({ "responseModalities": request.modalities });
    if let Some(ratio) = &request.aspect_ratio {
        generation_config["imageConfig"] = json!({ "aspectRatio": ratio });
    }
    json!({
        "contents": [{ "parts": [{ "text": request.prompt }] }],
        "generationConfig": generation_config,
    })
}

/// Pulls the first image and all text out of a response.
fn extract_image(response: GenerateResponse, model: &str) -> ToolResult<GeneratedImage> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        warn!(reason = %reason, "prompt blocked by Gemini");
        return Err(ToolError::remote(None, format!("prompt was blocked: {reason}")));
    }

    let mut texts = Vec::new();
    let mut image = None;
    let mut finish_reason = None;
    for candidate in response.candidates {
        finish_reason = finish_reason.or(candidate.finish_reason);
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                texts.push(text);
            }
            if image.is_none() {
                image = part.inline_data;
            }
        }
    }

    let Some(inline) = image else {
        let reason = finish_reason.unwrap_or_else(|| "no image data".to_string());
        return Err(ToolError::remote(
            None,
            format!("model returned no image ({reason})"),
        ));
    };
    let bytes = STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| ToolError::remote(None, format!("invalid base64 image data: {e}")))?;

    Ok(GeneratedImage {
        bytes,
        mime_type: inline.mime_type,
        text: (!texts.is_empty()).then(|| texts.join("\n")),
        model: model.to_string(),
    })
}

/// HTTP client for the Gemini API.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> ToolResult<Self> {
        Ok(Self {
            client: build_client(config.timeout, false)?,
            base_url: config.base_url,
            model: config.model,
            api_key: config.api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ImageApi for GeminiClient {
    async fn generate_image(&self, request: ImageRequest) -> ToolResult<GeneratedImage> {
        let action = format!("{}:generateContent", self.model);
        let url = endpoint(&self.base_url, &["models", &action])?;
        debug!(model = %self.model, "POST generateContent");

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request_body(&request))
            .send()
            .await
            .map_err(|e| transport_error(e, &self.api_key))?;
        let body = read_json(response, &self.api_key).await?;
        let parsed: GenerateResponse = serde_json::from_value(body)
            .map_err(|e| ToolError::remote(None, format!("unexpected Gemini response: {e}")))?;

        let image = extract_image(parsed, &self.model)?;
        info!(
            model = %self.model,
            mime_type = %image.mime_type,
            bytes = image.bytes.len(),
            "image generated"
        );
        Ok(image)
    }
}
