use anyhow::Context as _;
use axum::Json;
use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toto_mcp_server::app;
use toto_mcp_server::config::Settings;
use toto_openapi_tools::config::ApiServerConfig;
use toto_test_support::{McpSession, TestServer, tool_call_is_error, tool_call_text, wait_http_ok};

const EVENTS_SPEC: &str = r#"
openapi: "3.0.0"
info: { title: Events, version: "1" }
paths:
  /events:
    get:
      operationId: listEvents
      parameters:
        - name: kind
          in: query
          schema: { type: string }
      responses:
        "200": { description: ok }
"#;

fn bearer_of(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Topics and events API that insists on `Bearer good-token`.
async fn upstream() -> anyhow::Result<TestServer> {
    let router = Router::new()
        .route(
            "/topics",
            get(|headers: HeaderMap| async move {
                if bearer_of(&headers) != "Bearer good-token" {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                Ok(Json(json!({
                    "topics": [{ "name": "wind", "id": "t1" }, { "name": "solar" }]
                })))
            }),
        )
        .route("/openapi.yaml", get(|| async { EVENTS_SPEC }))
        .route(
            "/events",
            get(|headers: HeaderMap| async move {
                Json(json!({ "seenAuthorization": bearer_of(&headers) }))
            }),
        );
    TestServer::spawn(router).await
}

async fn mcp_server(upstream: &TestServer, require_auth: bool) -> anyhow::Result<TestServer> {
    let mut openapi = BTreeMap::new();
    openapi.insert(
        "events".to_string(),
        ApiServerConfig::forwarding(upstream.url("/openapi.yaml"), Some(upstream.base_url())),
    );
    let settings = Settings {
        name: "integration".to_string(),
        bind: "127.0.0.1:0".parse()?,
        path: "/mcp".to_string(),
        require_auth,
        topics_base_url: Some(upstream.base_url()),
        openapi,
        call_timeout: Duration::from_secs(5),
        startup_timeout: Duration::from_secs(5),
    };

    let server = app::build_server(&settings).await?;
    let router = app::router(server, &settings.path, require_auth, &CancellationToken::new());
    TestServer::spawn(router).await
}

fn error_of(msg: &Value) -> anyhow::Result<(i64, String)> {
    let code = msg
        .pointer("/error/code")
        .and_then(Value::as_i64)
        .with_context(|| format!("expected JSON-RPC error, got {msg}"))?;
    let message = msg
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok((code, message))
}

#[tokio::test]
async fn health_is_public() -> anyhow::Result<()> {
    let up = upstream().await?;
    let server = mcp_server(&up, true).await?;
    wait_http_ok(&server.url("/health"), Duration::from_secs(5)).await?;

    let resp = reqwest::get(server.url("/health")).await?;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await?, "ok");
    Ok(())
}

#[tokio::test]
async fn required_auth_rejects_before_mcp_handling() -> anyhow::Result<()> {
    let up = upstream().await?;
    let server = mcp_server(&up, true).await?;
    let client = reqwest::Client::new();
    let init = json!({ "jsonrpc": "2.0", "id": 0, "method": "initialize", "params": {} });

    let missing = client
        .post(server.url("/mcp"))
        .header("Accept", "application/json, text/event-stream")
        .json(&init)
        .send()
        .await?;
    assert_eq!(missing.status(), 401);
    assert_eq!(missing.headers()["www-authenticate"], "Bearer");
    let body: Value = missing.json().await?;
    assert_eq!(body["error"]["code"], "missing_authorization");

    let malformed = client
        .post(server.url("/mcp"))
        .header("Accept", "application/json, text/event-stream")
        .header("Authorization", "Basic Zm9vOmJhcg==")
        .json(&init)
        .send()
        .await?;
    assert_eq!(malformed.status(), 401);
    assert_eq!(
        malformed.headers()["www-authenticate"],
        "Bearer error=\"invalid_request\""
    );

    // A well-formed credential gets through to the MCP handshake.
    McpSession::connect(&server.url("/mcp"), Some("good-token")).await?;
    Ok(())
}

#[tokio::test]
async fn tools_use_the_callers_credential() -> anyhow::Result<()> {
    let up = upstream().await?;
    let server = mcp_server(&up, false).await?;
    let mcp = McpSession::connect(&server.url("/mcp"), Some("good-token")).await?;

    let list = mcp.request(1, "tools/list", json!({})).await?;
    let names: Vec<&str> = list
        .pointer("/result/tools")
        .and_then(Value::as_array)
        .context("tools/list result")?
        .iter()
        .filter_map(|t| t.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, vec!["greet", "get_tome_topics", "listEvents"]);

    let greet = mcp.call_tool(2, "greet", json!({ "name": "Ada" })).await?;
    assert!(!tool_call_is_error(&greet));
    assert_eq!(tool_call_text(&greet)?, "Hello, Ada!");

    let topics = mcp.call_tool(3, "get_tome_topics", json!({})).await?;
    assert_eq!(
        topics.pointer("/result/structuredContent/topics"),
        Some(&json!([{ "name": "wind", "id": "t1" }, { "name": "solar", "id": "" }]))
    );

    let events = mcp.call_tool(4, "listEvents", json!({ "kind": "outage" })).await?;
    let body: Value = serde_json::from_str(&tool_call_text(&events)?)?;
    assert_eq!(body["seenAuthorization"], "Bearer good-token");
    Ok(())
}

#[tokio::test]
async fn missing_credential_is_an_mcp_error() -> anyhow::Result<()> {
    let up = upstream().await?;
    let server = mcp_server(&up, false).await?;
    let mcp = McpSession::connect(&server.url("/mcp"), None).await?;

    let (code, message) = error_of(&mcp.call_tool(1, "greet", json!({ "name": "Ada" })).await?)?;
    assert_eq!(code, -32600);
    assert_eq!(message, "Authorization header missing");

    let (code, _) = error_of(&mcp.call_tool(2, "listEvents", json!({})).await?)?;
    assert_eq!(code, -32600);

    let (code, _) = error_of(&mcp.call_tool(3, "does_not_exist", json!({})).await?)?;
    assert_eq!(code, -32602);
    Ok(())
}

#[tokio::test]
async fn upstream_rejection_surfaces_as_an_error() -> anyhow::Result<()> {
    let up = upstream().await?;
    let server = mcp_server(&up, false).await?;
    let mcp = McpSession::connect(&server.url("/mcp"), Some("stale-token")).await?;

    let (code, message) = error_of(&mcp.call_tool(1, "get_tome_topics", json!({})).await?)?;
    assert_eq!(code, -32603);
    assert!(message.contains("401"), "{message}");
    Ok(())
}
