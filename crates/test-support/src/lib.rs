//! Shared helpers for integration tests: in-process HTTP servers and a small MCP client.

use anyhow::Context as _;
use futures::StreamExt as _;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt as _;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;

/// An axum router served on an ephemeral localhost port. The server stops when this is dropped.
pub struct TestServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Bind `127.0.0.1:0` and serve `router` in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn spawn(router: axum::Router) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind ephemeral port")?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(Self { addr, task })
    }

    /// `http://127.0.0.1:<port>`
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poll an HTTP URL until it returns a success status.
///
/// # Errors
///
/// Returns an error if the timeout elapses first.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
}

/// Minimal client for a streamable HTTP MCP endpoint.
pub struct McpSession {
    client: reqwest::Client,
    endpoint: String,
    bearer: Option<String>,
    session_id: String,
}

impl McpSession {
    /// Run the `initialize` handshake against `endpoint` (e.g. `http://127.0.0.1:1234/mcp`).
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint rejects the handshake.
    pub async fn connect(endpoint: &str, bearer: Option<&str>) -> anyhow::Result<Self> {
        let mut session = Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            bearer: bearer.map(str::to_string),
            session_id: String::new(),
        };

        let init = session
            .post(json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": {},
                    "clientInfo": { "name": "toto-integration-tests", "version": "0" }
                }
            }))
            .await?
            .error_for_status()
            .context("initialize status")?;

        session.session_id = init
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|h| h.to_str().ok())
            .context("missing Mcp-Session-Id header")?
            .to_string();

        let msg = first_json_event(init).await?;
        anyhow::ensure!(msg.get("id") == Some(&json!(0)), "unexpected initialize reply: {msg}");

        let ack = session
            .post(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .await?;
        anyhow::ensure!(
            ack.status().as_u16() == 202,
            "notifications/initialized returned {}",
            ack.status()
        );

        Ok(session)
    }

    /// Send a JSON-RPC request and wait for its reply.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or timeout.
    pub async fn request(&self, id: u64, method: &str, params: Value) -> anyhow::Result<Value> {
        let resp = self
            .post(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await?
            .error_for_status()
            .with_context(|| format!("{method} status"))?;

        tokio::time::timeout(Duration::from_secs(10), first_json_event(resp))
            .await
            .with_context(|| format!("timeout waiting for {method} reply"))?
    }

    /// `tools/call` shorthand.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn call_tool(&self, id: u64, name: &str, arguments: Value) -> anyhow::Result<Value> {
        self.request(id, "tools/call", json!({ "name": name, "arguments": arguments }))
            .await
    }

    async fn post(&self, body: Value) -> anyhow::Result<reqwest::Response> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json, text/event-stream")
            .json(&body);
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }
        if !self.session_id.is_empty() {
            req = req.header("Mcp-Session-Id", &self.session_id);
        }
        req.send().await.context("POST mcp endpoint")
    }
}

/// Text of the first content block of a `tools/call` reply.
///
/// # Errors
///
/// Returns an error if the reply has no text content.
pub fn tool_call_text(msg: &Value) -> anyhow::Result<String> {
    msg.pointer("/result/content/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .with_context(|| format!("no text content in {msg}"))
}

/// Whether a `tools/call` reply is a tool-level error result.
#[must_use]
pub fn tool_call_is_error(msg: &Value) -> bool {
    msg.pointer("/result/isError") == Some(&json!(true))
}

/// Read SSE events until one carries a JSON payload. Empty priming events are skipped.
async fn first_json_event(resp: reqwest::Response) -> anyhow::Result<Value> {
    let is_json = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if is_json {
        return resp.json().await.context("parse JSON reply");
    }

    let stream = Box::pin(resp.bytes_stream().map(|r| r.map_err(std::io::Error::other)));
    let mut lines = tokio::io::BufReader::new(StreamReader::new(stream)).lines();

    let mut data: Vec<String> = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        if line.is_empty() {
            let payload = data.join("\n");
            data.clear();
            if payload.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&payload).context("parse event data as JSON");
        }
        if let Some(v) = line.strip_prefix("data:") {
            data.push(v.trim_start().to_string());
        }
    }

    anyhow::bail!("event stream ended without a JSON message")
}
