//! The MCP tool surface: built-in tools plus every configured `OpenAPI` source.

use crate::error::{Result, ServerError};
use crate::topics::TopicsClient;
use axum::http::request::Parts;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool, ToolAnnotations,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use toto_bearer_auth::{AuthorizationError, Credential, extract_bearer_token};
use toto_openapi_tools::runtime::OpenApiToolSource;

const GREET: &str = "greet";
const GET_TOME_TOPICS: &str = "get_tome_topics";

/// Outcome of reading the caller's bearer credential from the inbound HTTP request.
pub type CallerCredential = std::result::Result<Credential, AuthorizationError>;

/// Cheap to clone; one instance is handed to every MCP session.
#[derive(Clone)]
pub struct TotoMcpServer {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    topics: Option<TopicsClient>,
    sources: Vec<OpenApiToolSource>,
}

#[derive(Debug, Deserialize)]
struct GreetArgs {
    name: String,
}

impl TotoMcpServer {
    #[must_use]
    pub fn new(
        name: String,
        topics: Option<TopicsClient>,
        sources: Vec<OpenApiToolSource>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                topics,
                sources,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn builtin_tools(&self) -> Vec<Tool> {
        let mut tools = vec![tool(
            GREET,
            "Greet a person by name.",
            json!({
                "type": "object",
                "properties": { "name": { "type": "string", "description": "Who to greet" } },
                "required": ["name"],
            }),
            false,
        )];
        if self.inner.topics.is_some() {
            tools.push(tool(
                GET_TOME_TOPICS,
                "Get a list of topics from the Tome API.",
                json!({ "type": "object", "properties": {} }),
                true,
            ));
        }
        tools
    }

    /// All tools, built-ins first. `OpenAPI` tools shadowed by an earlier name are dropped.
    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        let mut tools = self.builtin_tools();
        let mut seen: HashSet<String> = tools.iter().map(|t| t.name.to_string()).collect();

        for source in &self.inner.sources {
            for t in source.list_tools() {
                if seen.insert(t.name.to_string()) {
                    tools.push(t);
                } else {
                    tracing::warn!(
                        source = %source.name(),
                        tool = %t.name,
                        "tool name already taken; not exposed"
                    );
                }
            }
        }
        tools
    }

    /// Run tool `name` for a caller.
    ///
    /// # Errors
    ///
    /// - [`ServerError::UnknownTool`] for names no tool answers to
    /// - [`ServerError::Unauthorized`] when the tool needs the caller's credential and it is
    ///   missing or malformed
    /// - tool-specific failures (invalid arguments, upstream errors)
    pub async fn call(
        &self,
        name: &str,
        arguments: Value,
        caller: CallerCredential,
    ) -> Result<CallToolResult> {
        match name {
            GREET => {
                caller?;
                let args: GreetArgs = serde_json::from_value(arguments)
                    .map_err(|e| ServerError::InvalidArguments(e.to_string()))?;
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Hello, {}!",
                    args.name
                ))]))
            }
            GET_TOME_TOPICS if self.inner.topics.is_some() => {
                let cred = caller?;
                let Some(client) = &self.inner.topics else {
                    return Err(ServerError::UnknownTool(name.to_string()));
                };
                let topics = client.list(&cred).await?;
                Ok(CallToolResult::structured(json!({ "topics": topics })))
            }
            _ => {
                let source = self
                    .inner
                    .sources
                    .iter()
                    .find(|s| s.has_tool(name))
                    .ok_or_else(|| ServerError::UnknownTool(name.to_string()))?;

                let cred = if source.forwards_caller_credential() {
                    Some(caller?)
                } else {
                    caller.ok()
                };
                Ok(source.call_tool(name, arguments, cred.as_ref()).await?)
            }
        }
    }
}

fn tool(name: &'static str, description: &'static str, schema: Value, open_world: bool) -> Tool {
    let schema: JsonObject = match schema {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    let mut t = Tool::new(name, description, Arc::new(schema));
    t.annotations = Some(ToolAnnotations {
        title: None,
        read_only_hint: Some(true),
        destructive_hint: Some(false),
        idempotent_hint: Some(true),
        open_world_hint: Some(open_world),
    });
    t
}

/// The bearer credential of the HTTP request that carried this MCP message.
///
/// A credential stored by the `require_bearer` middleware wins over re-parsing headers.
fn caller_from_context(context: &RequestContext<RoleServer>) -> CallerCredential {
    let Some(parts) = context.extensions.get::<Parts>() else {
        return Err(AuthorizationError::Missing);
    };
    if let Some(cred) = parts.extensions.get::<Credential>() {
        return Ok(cred.clone());
    }
    extract_bearer_token(&parts.headers)
}

impl ServerHandler for TotoMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        let mut implementation = Implementation::from_build_env();
        implementation.name = self.inner.name.clone();
        implementation.version = env!("CARGO_PKG_VERSION").to_string();
        info.server_info = implementation;
        info.instructions = Some(
            "Tools act on behalf of the caller; send `Authorization: Bearer <token>`.".to_string(),
        );
        info
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tools(),
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let caller = caller_from_context(&context);
        let arguments = Value::Object(request.arguments.unwrap_or_default());

        match self.call(&request.name, arguments, caller).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(tool = %request.name, error = %e, "tool call failed");
                Err(e.into())
            }
        }
    }
}
