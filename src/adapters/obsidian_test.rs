//! Tests for the Obsidian adapter against a mock HTTP server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::adapters::obsidian::*;
use crate::config::ObsidianConfig;
use crate::error::ToolError;

fn client_for(server: &MockServer) -> ObsidianClient {
    ObsidianClient::new(ObsidianConfig {
        base_url: server.uri(),
        api_key: "vault-token".to_string(),
        verify_tls: false,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn test_list_root_uses_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vault/"))
        .and(header("Authorization", "Bearer vault-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"files": ["daily/", "index.md"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let files = client_for(&server).list_files(None).await.unwrap();
    assert_eq!(files, vec!["daily/".to_string(), "index.md".to_string()]);
}

#[tokio::test]
async fn test_list_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vault/daily/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": ["2025-01-01.md"]})))
        .mount(&server)
        .await;

    let files = client_for(&server)
        .list_files(Some("daily".to_string()))
        .await
        .unwrap();
    assert_eq!(files, vec!["2025-01-01.md".to_string()]);
}

#[tokio::test]
async fn test_get_file_returns_markdown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vault/notes/a.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# A\n\nbody"))
        .mount(&server)
        .await;

    let text = client_for(&server).get_file("notes/a.md").await.unwrap();
    assert_eq!(text, "# A\n\nbody");
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vault/missing.md"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"errorCode": 40400, "message": "File not found"})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server).get_file("missing.md").await.unwrap_err();
    assert!(matches!(err, ToolError::NotFound { ref message } if message == "File not found"));
}

#[tokio::test]
async fn test_bad_token_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vault/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client_for(&server).list_files(None).await.unwrap_err();
    assert!(matches!(err, ToolError::Authentication));
}

#[tokio::test]
async fn test_traversal_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client_for(&server).get_file("../outside.md").await.unwrap_err();
    assert!(matches!(err, ToolError::Validation { .. }));
}

#[tokio::test]
async fn test_search_sends_query_and_context_length() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search/simple/"))
        .and(query_param("query", "rust"))
        .and(query_param("contextLength", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"filename": "notes/a.md", "score": 1.5, "matches": [{"context": "learning rust", "match": {"start": 9, "end": 13}}]}
        ])))
        .mount(&server)
        .await;

    let results = client_for(&server).search("rust", 50).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].filename, "notes/a.md");
    assert_eq!(results[0].matches[0].context, "learning rust");
}

#[tokio::test]
async fn test_patch_sends_operation_headers() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/vault/notes/a.md"))
        .and(header("Operation", "append"))
        .and(header("Target-Type", "heading"))
        .and(header("Target", "Tasks"))
        .and(body_string("- [ ] new"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .patch_content(PatchRequest {
            path: "notes/a.md".to_string(),
            operation: PatchOperation::Append,
            target_type: TargetType::Heading,
            target: "Tasks".to_string(),
            content: "- [ ] new".to_string(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_append_posts_markdown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vault/inbox.md"))
        .and(header("Content-Type", "text/markdown"))
        .and(body_string("\nmore"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .append_content("inbox.md", "\nmore")
        .await
        .unwrap();
}
