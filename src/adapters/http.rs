//! Shared HTTP plumbing for the REST-backed adapters.
//!
//! Builds `reqwest` clients and translates upstream responses into the
//! error taxonomy: 401/403 become `Authentication`, 404 becomes
//! `NotFound`, everything else non-2xx becomes `Remote` with the upstream
//! status. Any text that leaves this module has credentials redacted.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use tracing::warn;

use crate::error::{ToolError, ToolResult};

const MAX_ERROR_BODY: usize = 500;
const REDACTED: &str = "[REDACTED]";

/// Installs the ring crypto provider for rustls. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Builds a client with the adapter's timeout.
pub fn build_client(timeout: Duration, accept_invalid_certs: bool) -> ToolResult<Client> {
    install_crypto_provider();
    Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| ToolError::remote(None, format!("failed to build HTTP client: {e}")))
}

/// Appends percent-encoded path segments to `base`.
///
/// An empty trailing segment produces a trailing slash.
pub fn endpoint(base: &str, segments: &[&str]) -> ToolResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| ToolError::remote(None, format!("invalid base URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| ToolError::remote(None, "base URL cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Replaces every occurrence of `secret` in `text`.
pub fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, REDACTED)
}

/// Maps a transport-level failure (connect, timeout, decode) to `Remote`.
pub fn transport_error(err: reqwest::Error, secret: &str) -> ToolError {
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_decode() {
        "invalid response body"
    } else {
        "request failed"
    };
    let status = err.status().map(|s| s.as_u16());
    // Strip the URL: query strings may carry credentials.
    let message = redact(&err.without_url().to_string(), secret);
    warn!(kind, error = %message, "HTTP request failed");
    ToolError::remote(status, format!("{kind}: {message}"))
}

/// Translates a non-success status and its body into a `ToolError`.
pub fn status_error(status: StatusCode, body: &str, secret: &str) -> ToolError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!(status = status.as_u16(), "upstream rejected credentials");
            ToolError::Authentication
        }
        StatusCode::NOT_FOUND => ToolError::not_found(error_message(body, secret, status)),
        _ => {
            let message = error_message(body, secret, status);
            warn!(status = status.as_u16(), error = %message, "upstream request failed");
            ToolError::remote(Some(status.as_u16()), message)
        }
    }
}

/// Extracts a human-readable message from an error body.
///
/// Understands `{"message": ..}` and `{"error": {"message": ..}}` shapes;
/// falls back to the (truncated) raw body, then to the status reason.
fn error_message(body: &str, secret: &str, status: StatusCode) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("message")
            .and_then(Value::as_str)
            .or_else(|| v.pointer("/error/message").and_then(Value::as_str))
            .or_else(|| v.get("error").and_then(Value::as_str))
            .map(str::to_string)
    });
    let message = match from_json {
        Some(m) => m,
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
        None => body.trim().chars().take(MAX_ERROR_BODY).collect(),
    };
    redact(&message, secret)
}

/// Reads the response, failing on non-2xx. Returns the raw body text.
pub async fn read_text(response: Response, secret: &str) -> ToolResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(e, secret))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(status_error(status, &body, secret))
    }
}

/// Reads a JSON response, failing on non-2xx. An empty body yields `null`.
pub async fn read_json(response: Response, secret: &str) -> ToolResult<Value> {
    let body = read_text(response, secret).await?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| ToolError::remote(None, format!("invalid JSON from upstream: {e}")))
}
