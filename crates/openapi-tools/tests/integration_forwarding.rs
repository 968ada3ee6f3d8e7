//! End-to-end: load a spec from a mock upstream, call tools, check what the upstream saw.

use anyhow::Context as _;
use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use serde_json::{Value, json};
use std::time::Duration;
use toto_bearer_auth::{AuthorizationError, Credential};
use toto_openapi_tools::config::{ApiServerConfig, UpstreamAuth};
use toto_openapi_tools::error::OpenApiToolsError;
use toto_openapi_tools::runtime::OpenApiToolSource;
use toto_test_support::TestServer;

const SPEC: &str = r#"{
  "openapi": "3.0.0",
  "info": { "title": "Topics", "version": "1" },
  "servers": [{ "url": "/v1" }],
  "paths": {
    "/topics": {
      "get": {
        "operationId": "listTopics",
        "responses": { "200": { "description": "ok" } }
      }
    },
    "/topics/{id}": {
      "get": {
        "operationId": "getTopic",
        "parameters": [
          { "name": "id", "in": "path", "required": true, "schema": { "type": "string" } }
        ],
        "responses": { "200": { "description": "ok" } }
      }
    }
  }
}"#;

/// Echo back the Authorization header the upstream received.
async fn list_topics(headers: HeaderMap) -> Json<Value> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    Json(json!({ "authorization": auth, "topics": [{ "name": "rust", "id": 1 }] }))
}

async fn get_topic(Path(id): Path<String>) -> (StatusCode, String) {
    if id == "missing" {
        return (StatusCode::NOT_FOUND, r#"{"message":"no such topic"}"#.to_string());
    }
    (StatusCode::OK, format!(r#"{{"id":"{id}"}}"#))
}

async fn upstream() -> anyhow::Result<TestServer> {
    let router = Router::new()
        .route("/openapi.json", get(|| async { SPEC }))
        .route("/v1/topics", get(list_topics))
        .route("/v1/topics/{id}", get(get_topic));
    TestServer::spawn(router).await
}

async fn source(server: &TestServer, auth: UpstreamAuth) -> anyhow::Result<OpenApiToolSource> {
    let mut cfg = ApiServerConfig::forwarding(server.url("/openapi.json"), None);
    cfg.auth = auth;
    OpenApiToolSource::build(
        "topics".to_string(),
        cfg,
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .await
    .context("start tool source")
}

fn first_text(result: &rmcp::model::CallToolResult) -> anyhow::Result<Value> {
    let v = serde_json::to_value(result)?;
    let text = v
        .pointer("/content/0/text")
        .and_then(Value::as_str)
        .context("missing text content")?;
    Ok(serde_json::from_str(text)?)
}

#[tokio::test]
async fn relative_server_url_resolves_against_spec_url() -> anyhow::Result<()> {
    let server = upstream().await?;
    let src = source(&server, UpstreamAuth::None).await?;

    assert_eq!(src.inferred_base_url(), Some(server.url("/v1")));
    assert_eq!(src.spec_title().as_deref(), Some("Topics"));
    let names: Vec<String> = src.list_tools().iter().map(|t| t.name.to_string()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"listTopics".to_string()));
    assert!(names.contains(&"getTopic".to_string()));
    Ok(())
}

#[tokio::test]
async fn forwards_the_callers_bearer_credential() -> anyhow::Result<()> {
    let server = upstream().await?;
    let src = source(&server, UpstreamAuth::ForwardCaller).await?;
    assert!(src.forwards_caller_credential());

    let caller = Credential::new("caller-token");
    let result = src.call_tool("listTopics", json!({}), Some(&caller)).await?;
    let body = first_text(&result)?;

    assert_eq!(body["authorization"], "Bearer caller-token");
    assert_eq!(body["topics"][0]["name"], "rust");
    Ok(())
}

#[tokio::test]
async fn forwarding_without_a_caller_credential_fails_before_any_request() -> anyhow::Result<()> {
    let server = upstream().await?;
    let src = source(&server, UpstreamAuth::ForwardCaller).await?;

    let err = src
        .call_tool("listTopics", json!({}), None)
        .await
        .expect_err("missing credential must fail");
    assert!(matches!(
        err,
        OpenApiToolsError::Auth(AuthorizationError::Missing)
    ));
    Ok(())
}

#[tokio::test]
async fn static_bearer_ignores_the_caller() -> anyhow::Result<()> {
    let server = upstream().await?;
    let src = source(
        &server,
        UpstreamAuth::Bearer {
            token: "service-token".to_string(),
        },
    )
    .await?;

    let caller = Credential::new("caller-token");
    let body = first_text(&src.call_tool("listTopics", json!({}), Some(&caller)).await?)?;
    assert_eq!(body["authorization"], "Bearer service-token");
    Ok(())
}

#[tokio::test]
async fn non_success_status_becomes_http_error() -> anyhow::Result<()> {
    let server = upstream().await?;
    let src = source(&server, UpstreamAuth::None).await?;

    let ok = first_text(&src.call_tool("getTopic", json!({ "id": "42" }), None).await?)?;
    assert_eq!(ok["id"], "42");

    let err = src
        .call_tool("getTopic", json!({ "id": "missing" }), None)
        .await
        .expect_err("404 must fail");
    let msg = err.to_string();
    assert!(matches!(err, OpenApiToolsError::Http(_)), "{msg}");
    assert!(msg.contains("404"), "{msg}");
    assert!(msg.contains("no such topic"), "{msg}");
    Ok(())
}

#[tokio::test]
async fn unknown_tool_is_a_runtime_error() -> anyhow::Result<()> {
    let server = upstream().await?;
    let src = source(&server, UpstreamAuth::None).await?;
    let err = src
        .call_tool("nope", json!({}), None)
        .await
        .expect_err("unknown tool");
    assert!(matches!(err, OpenApiToolsError::Runtime(_)));
    Ok(())
}

#[tokio::test]
async fn loads_spec_from_a_file_and_enforces_hash_policy() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("openapi.json");
    std::fs::write(&path, SPEC)?;

    let mut cfg = ApiServerConfig::forwarding(
        path.to_string_lossy().to_string(),
        Some("http://127.0.0.1:9".to_string()),
    );
    cfg.spec_hash = Some("sha256:0000".to_string());
    cfg.spec_hash_policy = toto_openapi_tools::config::SpecHashPolicy::Fail;

    let err = OpenApiToolSource::build(
        "file".to_string(),
        cfg.clone(),
        Duration::from_secs(1),
        Duration::from_secs(5),
    )
    .await
    .err()
    .context("hash mismatch must fail startup")?;
    assert!(err.to_string().contains("hash mismatch"), "{err}");

    cfg.spec_hash_policy = toto_openapi_tools::config::SpecHashPolicy::Warn;
    let src = OpenApiToolSource::build(
        "file".to_string(),
        cfg,
        Duration::from_secs(1),
        Duration::from_secs(5),
    )
    .await?;
    assert!(src.has_tool("getTopic"));
    Ok(())
}

#[tokio::test]
async fn pinned_hash_mismatch_fails_startup_by_default() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("openapi.json");
    std::fs::write(&path, SPEC)?;

    let yaml = format!(
        "spec: '{}'\nbaseUrl: http://127.0.0.1:9\nspecHash: sha256:0000\n",
        path.display()
    );
    let cfg: ApiServerConfig = serde_yaml::from_str(&yaml)?;
    let err = OpenApiToolSource::build(
        "pinned".to_string(),
        cfg,
        Duration::from_secs(1),
        Duration::from_secs(5),
    )
    .await
    .err()
    .context("mismatched hash must fail startup")?;
    assert!(matches!(err, OpenApiToolsError::OpenApi(_)), "{err}");
    Ok(())
}

#[tokio::test]
async fn unreadable_spec_file_is_reported() {
    let cfg = ApiServerConfig::forwarding("/definitely/not/here.yaml", None);
    let err = OpenApiToolSource::build(
        "missing".to_string(),
        cfg,
        Duration::from_secs(1),
        Duration::from_secs(5),
    )
    .await
    .err()
    .expect("missing file must fail");
    assert!(matches!(err, OpenApiToolsError::OpenApiSpecReadFile { .. }));
}
