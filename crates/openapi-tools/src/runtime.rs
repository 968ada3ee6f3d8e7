//! Serve an `OpenAPI` document as a set of MCP tools.
//!
//! Each operation becomes one tool; a `tools/call` turns into one outbound HTTP request.

use crate::config::{
    ApiServerConfig, EndpointOverride, ParamOverride, SpecHashPolicy, UpstreamAuth,
};
use crate::error::{OpenApiToolsError, Result};
use crate::resolver::LocalResolver;
use crate::safety::sanitize_reqwest_error;
use base64::Engine as _;
use mime::Mime;
use openapiv3::{
    OpenAPI, Operation, Parameter, ParameterSchemaOrContent, ReferenceOr, RequestBody, Schema,
};
use parking_lot::RwLock;
use reqwest::{Client, Method};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use toto_bearer_auth::{AuthorizationError, Credential};
use url::Url;

/// Upper bound on a single upstream response body.
const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

/// One configured upstream API and the tools discovered from its document.
#[derive(Clone)]
pub struct OpenApiToolSource {
    /// Config key of this source.
    name: String,
    config: ApiServerConfig,
    /// `info.title` of the loaded spec
    spec_title: Arc<RwLock<Option<String>>>,
    tools: Arc<RwLock<Vec<GeneratedTool>>>,
    client: Client,
    /// Set by `start`
    base_url: Arc<RwLock<Option<String>>>,
    /// Used when `defaults.timeout` is unset
    default_timeout: Duration,
    /// Bounds `start`
    startup_timeout: Duration,
}

/// One operation, ready to be called.
#[derive(Debug, Clone)]
struct GeneratedTool {
    /// Exposed name, unique within the source
    name: String,
    /// Override or canonical name, before suffixing
    original_name: String,
    description: Option<String>,
    method: Method,
    /// e.g. `/topics/{id}`
    path: String,
    parameters: Vec<ToolParameter>,
    input_schema: Value,
}

/// One argument of a generated tool and where it goes on the wire.
#[derive(Debug, Clone)]
struct ToolParameter {
    /// Argument name in `inputSchema`
    tool_name: String,
    /// Parameter name sent upstream
    original_name: String,
    location: ParamLocation,
    required: bool,
    default: Option<Value>,
    schema: Value,
    /// `explode` for query parameters (form style)
    explode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

#[derive(Debug, Default)]
struct RequestParts {
    path: String,
    query_params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body_fields: serde_json::Map<String, Value>,
    body_payload: Option<Value>,
}

enum ToolResponse {
    Value(Value),
    Image { bytes: Vec<u8>, mime_type: String },
}

impl OpenApiToolSource {
    /// Configure a source without touching the network.
    ///
    /// Until [`Self::start`] succeeds the source has no tools.
    #[must_use]
    pub fn new(
        name: String,
        config: ApiServerConfig,
        default_timeout: Duration,
        startup_timeout: Duration,
    ) -> Self {
        let client = http_client(config.accept_invalid_certs).unwrap_or_else(|e| {
            tracing::warn!(source = %name, error = %e, "using a default HTTP client");
            Client::new()
        });

        if config.accept_invalid_certs {
            tracing::warn!(source = %name, "TLS certificate verification is disabled");
        }

        Self {
            name,
            config,
            spec_title: Arc::new(RwLock::new(None)),
            tools: Arc::new(RwLock::new(Vec::new())),
            client,
            base_url: Arc::new(RwLock::new(None)),
            default_timeout,
            startup_timeout,
        }
    }

    /// [`Self::new`] followed by [`Self::start`].
    ///
    /// # Errors
    ///
    /// Whatever [`Self::start`] returns.
    pub async fn build(
        name: String,
        config: ApiServerConfig,
        default_timeout: Duration,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let src = Self::new(name, config, default_timeout, startup_timeout);
        src.start().await?;
        Ok(src)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether calls need the MCP caller's bearer credential.
    #[must_use]
    pub fn forwards_caller_credential(&self) -> bool {
        self.config.auth == UpstreamAuth::ForwardCaller
    }

    /// Fetch the document, work out the base URL and discover tools.
    ///
    /// # Errors
    ///
    /// Document load or parse failures, an unusable base URL, or [`OpenApiToolsError::Startup`]
    /// when the startup timeout elapses.
    pub async fn start(&self) -> Result<()> {
        let startup = async {
            let spec = self.load_spec().await?;

            let base_url = self
                .config
                .base_url
                .clone()
                .or_else(|| spec.servers.first().map(|s| s.url.clone()));
            let Some(base_url) = base_url else {
                return Err(OpenApiToolsError::OpenApi(
                    "document has no servers entry and baseUrl is unset".to_string(),
                ));
            };
            let base_url = self.resolve_base_url(&base_url)?;

            let tools = self.discover_tools(&spec)?;
            Ok::<_, OpenApiToolsError>((spec, base_url, tools))
        };

        let (spec, base_url, tools) = match tokio::time::timeout(self.startup_timeout, startup)
            .await
        {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(OpenApiToolsError::Startup(format!(
                    "source '{}' not ready after {}s",
                    self.name,
                    self.startup_timeout.as_secs()
                )));
            }
        };

        tracing::info!(
            source = %self.name,
            base_url = %base_url,
            tools = tools.len(),
            "discovered tools from OpenAPI spec"
        );

        *self.base_url.write() = Some(base_url);
        *self.spec_title.write() = Some(spec.info.title);
        *self.tools.write() = tools;
        Ok(())
    }

    /// Read the document from a URL or a file and check its hash.
    async fn load_spec(&self) -> Result<OpenAPI> {
        let location = &self.config.spec;
        let content = if is_http_url(location) {
            tracing::info!(source = %self.name, spec = %location, "fetching OpenAPI spec");
            let url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::OpenApi(format!("document URL '{location}' does not parse: {e}"))
            })?;
            let fetch_err = |e: &reqwest::Error| OpenApiToolsError::OpenApiSpecFetch {
                url: location.clone(),
                message: sanitize_reqwest_error(e),
            };
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| fetch_err(&e))?;
            let bytes = read_body_limited(resp).await?;
            String::from_utf8(bytes).map_err(|_| OpenApiToolsError::OpenApiSpecFetch {
                url: location.clone(),
                message: "spec body is not valid UTF-8".to_string(),
            })?
        } else {
            tracing::info!(source = %self.name, spec = %location, "loading OpenAPI spec");
            std::fs::read_to_string(location).map_err(|e| {
                OpenApiToolsError::OpenApiSpecReadFile {
                    path: location.clone(),
                    source: e,
                }
            })?
        };

        self.verify_spec_hash(&content)?;

        // JSON is a subset of YAML, so serde_yaml handles both.
        serde_yaml::from_str(&content).map_err(|e| OpenApiToolsError::OpenApiSpecParse {
            location: location.clone(),
            source: e,
        })
    }

    fn verify_spec_hash(&self, content: &str) -> Result<()> {
        let Some(expected) = &self.config.spec_hash else {
            return Ok(());
        };
        let actual = format!("sha256:{}", hex::encode(Sha256::digest(content.as_bytes())));
        if actual == *expected {
            return Ok(());
        }
        match self.config.spec_hash_policy {
            SpecHashPolicy::Fail => Err(OpenApiToolsError::OpenApi(format!(
                "document hash mismatch: configured {expected}, computed {actual}",
            ))),
            SpecHashPolicy::Warn => {
                tracing::warn!(
                    source = %self.name,
                    expected = %expected,
                    actual = %actual,
                    "spec hash mismatch"
                );
                Ok(())
            }
            SpecHashPolicy::Ignore => Ok(()),
        }
    }

    fn resolve_base_url(&self, base_url: &str) -> Result<String> {
        if is_http_url(base_url) {
            return Ok(base_url.to_string());
        }

        // Relative server URLs (e.g. "/api/v3") resolve against the spec URL when there is one.
        if is_http_url(&self.config.spec) {
            let mut spec_url = Url::parse(&self.config.spec).map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "document URL '{}' does not parse: {e}",
                    self.config.spec
                ))
            })?;
            spec_url.set_fragment(None);
            let resolved = spec_url.join(base_url).map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "server URL '{base_url}' cannot be joined to the document URL: {e}",
                ))
            })?;
            return Ok(resolved.to_string());
        }

        Err(OpenApiToolsError::OpenApi(format!(
            "server URL '{base_url}' is relative and the document was not fetched over http(s); set baseUrl",
        )))
    }

    /// Walk every path item and generate a tool per selected operation.
    ///
    /// Operations whose tool cannot be generated (unsupported parameters, collisions) are
    /// skipped with a warning.
    fn discover_tools(&self, spec: &OpenAPI) -> Result<Vec<GeneratedTool>> {
        let resolver = LocalResolver::new(self.config.spec.clone(), spec)?;
        let mut tools = Vec::new();
        let mut tool_names: HashSet<String> = HashSet::new();

        for (path, item) in &spec.paths.paths {
            let path_item = match resolver.resolve(item) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(source = %self.name, path = %path, error = %e, "skipping path");
                    continue;
                }
            };

            let methods = [
                ("get", &path_item.get),
                ("post", &path_item.post),
                ("put", &path_item.put),
                ("delete", &path_item.delete),
                ("patch", &path_item.patch),
            ];

            for (method, operation) in methods {
                let Some(op) = operation.as_ref() else {
                    continue;
                };

                let explicit = self
                    .config
                    .endpoints
                    .get(path)
                    .and_then(|methods| methods.get(method));
                let should_generate = explicit.is_some()
                    || (self.config.auto_discover.is_enabled()
                        && self.should_auto_discover(method, path));
                if !should_generate {
                    continue;
                }

                let op_ctx = OperationContext {
                    path,
                    method,
                    operation: op,
                    path_item_params: &path_item.parameters,
                    explicit,
                };
                match self.generate_tool(&resolver, &op_ctx, &mut tool_names) {
                    Ok(tool) => tools.push(tool),
                    Err(e) => {
                        tracing::warn!(
                            source = %self.name,
                            operation = %format!("{} {path}", method.to_uppercase()),
                            error = %e,
                            "skipping operation"
                        );
                    }
                }
            }
        }

        Ok(tools)
    }

    /// Exclude patterns win; when include patterns exist one of them must match.
    fn should_auto_discover(&self, method: &str, path: &str) -> bool {
        let operation = format!("{} {}", method.to_uppercase(), path);
        let auto = &self.config.auto_discover;

        if auto
            .exclude_patterns()
            .iter()
            .any(|p| glob_match(p, &operation))
        {
            return false;
        }

        let include = auto.include_patterns();
        include.is_empty() || include.iter().any(|p| glob_match(p, &operation))
    }

    fn generate_tool(
        &self,
        resolver: &LocalResolver,
        op_ctx: &OperationContext<'_>,
        tool_names: &mut HashSet<String>,
    ) -> Result<GeneratedTool> {
        let OperationContext {
            path,
            method,
            operation,
            explicit,
            ..
        } = *op_ctx;

        let base_name = match (explicit, &operation.operation_id) {
            (Some(cfg), _) => cfg.tool.clone(),
            (None, Some(op_id)) => op_id.clone(),
            (None, None) => canonical_tool_name(method, path),
        };

        let description = explicit
            .and_then(|c| c.description.clone())
            .or_else(|| operation.summary.clone())
            .or_else(|| operation.description.clone())
            .unwrap_or_else(|| format!("Calls {} {}", method.to_uppercase(), path));

        let parameters = self.collect_parameters(resolver, op_ctx)?;
        let input_schema = build_input_schema(&parameters);
        let http_method = resolve_http_method(method)?;

        Ok(GeneratedTool {
            name: reserve_unique_tool_name(tool_names, &base_name),
            original_name: base_name,
            description: Some(description),
            method: http_method,
            path: path.to_string(),
            parameters,
            input_schema,
        })
    }

    fn collect_parameters(
        &self,
        resolver: &LocalResolver,
        op_ctx: &OperationContext<'_>,
    ) -> Result<Vec<ToolParameter>> {
        let param_configs = op_ctx.explicit.map(|c| &c.params);
        let merged = merge_parameters(
            resolver,
            op_ctx.path_item_params,
            &op_ctx.operation.parameters,
        )?;

        let mut parameters = Vec::new();
        let mut names: HashSet<String> = HashSet::new();

        for param in &merged {
            let info = extract_parameter(resolver, param, param_configs)?;
            if !names.insert(info.tool_name.clone()) {
                return Err(OpenApiToolsError::ParamCollision(format!(
                    "argument '{}' is declared twice by {} {}. \
                     Rename one of them under `endpoints`.",
                    info.tool_name,
                    op_ctx.method.to_uppercase(),
                    op_ctx.path
                )));
            }
            parameters.push(info);
        }

        if let Some(body_ref) = &op_ctx.operation.request_body {
            let body = resolver.resolve(body_ref)?;
            if let Some(schema_ref) = json_media_schema(&body) {
                for bp in extract_body_params(resolver, &body, schema_ref, param_configs)? {
                    if !names.insert(bp.tool_name.clone()) {
                        return Err(OpenApiToolsError::ParamCollision(format!(
                            "body property '{}' shadows another argument of {} {}. \
                             Rename one of them under `endpoints`.",
                            bp.tool_name,
                            op_ctx.method.to_uppercase(),
                            op_ctx.path
                        )));
                    }
                    parameters.push(bp);
                }
            }
        }

        Ok(parameters)
    }

    /// Tools in discovery order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools
            .read()
            .iter()
            .map(|t| {
                let schema_obj = t
                    .input_schema
                    .as_object()
                    .cloned()
                    .unwrap_or_else(JsonObject::new);
                let mut tool = Tool::new(
                    t.name.clone(),
                    t.description.clone().unwrap_or_default(),
                    Arc::new(schema_obj),
                );
                tool.annotations = Some(crate::semantics::annotations_for_method(&t.method));
                tool
            })
            .collect()
    }

    /// Whether this source exposes a tool called `name`.
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.read().iter().any(|t| t.name == name)
    }

    /// Call the operation behind `name` with `arguments`.
    ///
    /// `caller` is the bearer credential of the MCP request, if it presented one; it is only
    /// used when the source is configured with [`UpstreamAuth::ForwardCaller`].
    ///
    /// # Errors
    ///
    /// [`OpenApiToolsError::Runtime`] for an unknown tool or a missing argument,
    /// [`OpenApiToolsError::Auth`] when forwarding without a caller credential,
    /// [`OpenApiToolsError::Http`] or [`OpenApiToolsError::Request`] when the upstream call fails.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        caller: Option<&Credential>,
    ) -> Result<CallToolResult> {
        // Clone under the lock; it must not be held across await.
        let tool = {
            let tools = self.tools.read();
            tools
                .iter()
                .find(|t| t.name == name || t.original_name == name)
                .cloned()
                .ok_or_else(|| OpenApiToolsError::Runtime(format!("no tool named '{name}'")))?
        };

        match self.execute_request(&tool, &arguments, caller).await? {
            ToolResponse::Image { bytes, mime_type } => {
                let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
                Ok(CallToolResult::success(vec![Content::image(b64, mime_type)]))
            }
            ToolResponse::Value(body) => {
                let text = match &body {
                    Value::String(s) => s.clone(),
                    other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
        }
    }

    async fn execute_request(
        &self,
        tool: &GeneratedTool,
        arguments: &Value,
        caller: Option<&Credential>,
    ) -> Result<ToolResponse> {
        let base_url = self
            .base_url
            .read()
            .clone()
            .ok_or_else(|| OpenApiToolsError::Runtime("source has not been started".to_string()))?;

        let mut parts = build_request_parts(tool, arguments)?;
        if let UpstreamAuth::Query { name, value } = &self.config.auth {
            parts.query_params.push((name.clone(), value.clone()));
        }
        let url = build_url(&base_url, &parts.path, &parts.query_params)?;

        tracing::debug!(
            source = %self.name,
            tool = %tool.name,
            method = %tool.method,
            path = %parts.path,
            "calling upstream API"
        );

        let mut request = self.client.request(tool.method.clone(), url);
        request = self.apply_auth(request, caller)?;
        for (key, value) in &self.config.defaults.headers {
            request = request.header(key, value);
        }
        for (key, value) in &parts.headers {
            request = request.header(key, value);
        }
        if let Some(payload) = &parts.body_payload {
            request = request.json(payload);
        } else if !parts.body_fields.is_empty() {
            request = request.json(&parts.body_fields);
        }
        if let Some(t) = self.effective_timeout() {
            request = request.timeout(t);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OpenApiToolsError::Request(sanitize_reqwest_error(&e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = read_body_limited(response).await?;

        if status.is_success() {
            if is_image_content_type(content_type.as_deref()) {
                let mime_type = content_type.unwrap_or_else(|| "image/*".to_string());
                return Ok(ToolResponse::Image { bytes, mime_type });
            }
            return Ok(ToolResponse::Value(parse_body(&bytes, content_type.as_deref())));
        }

        let error_body = parse_body(&bytes, content_type.as_deref());
        let reason = status.canonical_reason().unwrap_or("Unknown");
        Err(OpenApiToolsError::Http(format!(
            "API returned {} {reason}: {error_body}",
            status.as_u16()
        )))
    }

    fn apply_auth(
        &self,
        request: reqwest::RequestBuilder,
        caller: Option<&Credential>,
    ) -> Result<reqwest::RequestBuilder> {
        Ok(match &self.config.auth {
            UpstreamAuth::Bearer { token } => request.bearer_auth(token),
            UpstreamAuth::Header { name, value } => request.header(name, value),
            UpstreamAuth::ForwardCaller => {
                let cred = caller.ok_or(AuthorizationError::Missing)?;
                request.bearer_auth(cred.expose())
            }
            // Query auth is applied while building the URL.
            UpstreamAuth::Query { .. } | UpstreamAuth::None => request,
        })
    }

    fn effective_timeout(&self) -> Option<Duration> {
        match self.config.defaults.timeout {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(self.default_timeout),
        }
    }

    /// The base URL inferred during `start`.
    ///
    /// `None` before `start`.
    #[must_use]
    pub fn inferred_base_url(&self) -> Option<String> {
        self.base_url.read().clone()
    }

    /// The `info.title` of the parsed spec, once started.
    #[must_use]
    pub fn spec_title(&self) -> Option<String> {
        self.spec_title.read().clone()
    }
}

#[derive(Clone, Copy)]
struct OperationContext<'a> {
    path: &'a str,
    method: &'static str,
    operation: &'a Operation,
    path_item_params: &'a [ReferenceOr<Parameter>],
    explicit: Option<&'a EndpointOverride>,
}

// ============================================================================
// Tool generation helpers
// ============================================================================

/// Path-item parameters first, operation parameters override by (location, name).
fn merge_parameters(
    resolver: &LocalResolver,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<Parameter>> {
    fn key_for(p: &Parameter) -> (&'static str, String) {
        let loc = match p {
            Parameter::Path { .. } => "path",
            Parameter::Query { .. } => "query",
            Parameter::Header { .. } => "header",
            Parameter::Cookie { .. } => "cookie",
        };
        (loc, p.parameter_data_ref().name.clone())
    }

    let mut merged: Vec<Parameter> = Vec::new();
    let mut index: HashMap<(&'static str, String), usize> = HashMap::new();

    for p in path_item_params.iter().chain(operation_params) {
        let resolved = resolver.resolve(p)?;
        let key = key_for(&resolved);
        if let Some(i) = index.get(&key).copied() {
            merged[i] = resolved;
        } else {
            index.insert(key, merged.len());
            merged.push(resolved);
        }
    }

    Ok(merged)
}

fn extract_parameter(
    resolver: &LocalResolver,
    param: &Parameter,
    param_configs: Option<&HashMap<String, ParamOverride>>,
) -> Result<ToolParameter> {
    let (location, explode) = match param {
        Parameter::Path { .. } => (ParamLocation::Path, false),
        Parameter::Query { parameter_data, .. } => {
            // Form style explodes by default.
            (ParamLocation::Query, parameter_data.explode.unwrap_or(true))
        }
        Parameter::Header { .. } => (ParamLocation::Header, false),
        Parameter::Cookie { .. } => {
            return Err(OpenApiToolsError::OpenApi(
                "cookie parameters cannot be sent".to_string(),
            ));
        }
    };

    let data = param.parameter_data_ref();
    // Path params are always required.
    let required = location == ParamLocation::Path || data.required;
    let mut schema = parameter_schema(resolver, &data.format);

    let config = param_configs.and_then(|c| c.get(&data.name));
    if let Some(obj) = schema.as_object_mut() {
        let description = config
            .and_then(|c| c.description.clone())
            .or_else(|| data.description.clone());
        if let Some(desc) = description {
            obj.insert("description".to_string(), Value::String(desc));
        }
    }

    Ok(ToolParameter {
        tool_name: config
            .and_then(|c| c.rename.clone())
            .unwrap_or_else(|| data.name.clone()),
        original_name: data.name.clone(),
        location,
        required: config.and_then(|c| c.required).unwrap_or(required),
        default: config.and_then(|c| c.default.clone()),
        schema,
        explode,
    })
}

fn json_media_schema(body: &RequestBody) -> Option<&ReferenceOr<Schema>> {
    body.content
        .get("application/json")
        .or_else(|| {
            body.content
                .iter()
                .find(|(k, _)| k.to_ascii_lowercase().ends_with("json"))
                .map(|(_, v)| v)
        })
        .and_then(|mt| mt.schema.as_ref())
}

/// Object bodies are flattened into one argument per property; anything else becomes a
/// single `body` argument.
fn extract_body_params(
    resolver: &LocalResolver,
    body: &RequestBody,
    schema_ref: &ReferenceOr<Schema>,
    param_configs: Option<&HashMap<String, ParamOverride>>,
) -> Result<Vec<ToolParameter>> {
    let schema = resolver.resolve(schema_ref)?;

    let openapiv3::SchemaKind::Type(openapiv3::Type::Object(obj)) = &schema.schema_kind else {
        return Ok(vec![ToolParameter {
            tool_name: "body".to_string(),
            original_name: "body".to_string(),
            location: ParamLocation::Body,
            required: body.required,
            default: None,
            schema: schema_to_json(&schema),
            explode: false,
        }]);
    };

    let mut params = Vec::new();
    for (prop_name, prop_schema) in &obj.properties {
        // A property of an optional body cannot be required on its own.
        let required = body.required && obj.required.contains(prop_name);
        let mut prop_value = match resolver.resolve(prop_schema) {
            Ok(s) => schema_to_json(&s),
            Err(_) => json!({}),
        };

        let config = param_configs.and_then(|c| c.get(prop_name));
        if let Some(desc) = config.and_then(|c| c.description.clone())
            && let Some(o) = prop_value.as_object_mut()
        {
            o.insert("description".to_string(), Value::String(desc));
        }

        params.push(ToolParameter {
            tool_name: config
                .and_then(|c| c.rename.clone())
                .unwrap_or_else(|| prop_name.clone()),
            original_name: prop_name.clone(),
            location: ParamLocation::Body,
            required: config.and_then(|c| c.required).unwrap_or(required),
            default: config.and_then(|c| c.default.clone()),
            schema: prop_value,
            explode: false,
        });
    }
    Ok(params)
}

fn parameter_schema(resolver: &LocalResolver, format: &ParameterSchemaOrContent) -> Value {
    match format {
        ParameterSchemaOrContent::Schema(r) => match resolver.resolve(r) {
            Ok(s) => schema_to_json(&s),
            Err(_) => json!({ "type": "string" }),
        },
        ParameterSchemaOrContent::Content(_) => json!({ "type": "string" }),
    }
}

/// `OpenAPI` 3.0 schema objects are close enough to JSON Schema to pass through as-is.
fn schema_to_json(schema: &Schema) -> Value {
    serde_json::to_value(schema).unwrap_or_else(|_| json!({}))
}

fn build_input_schema(parameters: &[ToolParameter]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in parameters {
        let mut prop_schema = param.schema.clone();
        if let (Some(default), Some(obj)) = (&param.default, prop_schema.as_object_mut()) {
            obj.insert("default".to_string(), default.clone());
        }
        properties.insert(param.tool_name.clone(), prop_schema);

        if param.required && param.default.is_none() {
            required.push(param.tool_name.clone());
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

/// `get` + `/pet/{petId}` -> `get_pet_petId`, capped at 64 chars.
fn canonical_tool_name(method: &str, path: &str) -> String {
    let raw = format!("{}_{}", method.to_lowercase(), path);
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.is_empty() && !name.ends_with('_') {
            name.push('_');
        }
    }
    let mut name = name.trim_end_matches('_').to_string();
    name.truncate(64);
    name
}

fn reserve_unique_tool_name(tool_names: &mut HashSet<String>, base: &str) -> String {
    if tool_names.insert(base.to_string()) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| tool_names.insert(candidate.clone()))
        .unwrap_or_else(|| base.to_string())
}

fn resolve_http_method(method: &str) -> Result<Method> {
    match method {
        "get" => Ok(Method::GET),
        "post" => Ok(Method::POST),
        "put" => Ok(Method::PUT),
        "delete" => Ok(Method::DELETE),
        "patch" => Ok(Method::PATCH),
        other => Err(OpenApiToolsError::Runtime(format!(
            "method '{other}' is not an HTTP method",
        ))),
    }
}

/// `*` matches any sequence, `?` any single byte; everything else is literal.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some(b'*') => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some(b'?') => {
                pi += 1;
                ti += 1;
            }
            Some(&b) if b == t[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => {
                let Some((star_pi, star_ti)) = star else {
                    return false;
                };
                pi = star_pi + 1;
                ti = star_ti + 1;
                star = Some((star_pi, star_ti + 1));
            }
        }
    }

    p[pi..].iter().all(|&b| b == b'*')
}

// ============================================================================
// Request building
// ============================================================================

fn build_request_parts(tool: &GeneratedTool, arguments: &Value) -> Result<RequestParts> {
    let mut parts = RequestParts {
        path: tool.path.clone(),
        ..RequestParts::default()
    };

    for param in &tool.parameters {
        let value = arguments
            .get(&param.tool_name)
            .filter(|v| !v.is_null())
            .cloned()
            .or_else(|| param.default.clone());

        if param.required && value.is_none() {
            return Err(OpenApiToolsError::Runtime(format!(
                "required argument '{}' is missing",
                param.tool_name
            )));
        }

        let Some(val) = value.filter(|v| !v.is_null()) else {
            continue;
        };

        match param.location {
            ParamLocation::Path => {
                let encoded = encode_component(&value_to_string(&val));
                parts.path = parts
                    .path
                    .replace(&format!("{{{}}}", param.original_name), &encoded);
            }
            ParamLocation::Query => {
                parts
                    .query_params
                    .extend(serialize_query_param(&param.original_name, &val, param.explode));
            }
            ParamLocation::Header => {
                parts
                    .headers
                    .push((param.original_name.clone(), value_to_string(&val)));
            }
            ParamLocation::Body => {
                if param.original_name == "body" && param.tool_name == "body" {
                    parts.body_payload = Some(val);
                } else {
                    parts.body_fields.insert(param.original_name.clone(), val);
                }
            }
        }
    }

    if !parts.path.starts_with('/') {
        parts.path = format!("/{}", parts.path);
    }
    Ok(parts)
}

/// Form-style query serialization.
fn serialize_query_param(name: &str, value: &Value, explode: bool) -> Vec<(String, String)> {
    match value {
        Value::Array(items) if explode => items
            .iter()
            .map(|v| (name.to_string(), value_to_string(v)))
            .collect(),
        Value::Array(items) => {
            let joined = items.iter().map(value_to_string).collect::<Vec<_>>().join(",");
            vec![(name.to_string(), joined)]
        }
        Value::Object(map) if explode => map
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect(),
        Value::Object(map) => {
            let joined = map
                .iter()
                .flat_map(|(k, v)| [k.clone(), value_to_string(v)])
                .collect::<Vec<_>>()
                .join(",");
            vec![(name.to_string(), joined)]
        }
        scalar => vec![(name.to_string(), value_to_string(scalar))],
    }
}

fn build_url(base_url: &str, path: &str, query_params: &[(String, String)]) -> Result<Url> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut url =
        Url::parse(&joined).map_err(|e| OpenApiToolsError::Runtime(format!("Invalid URL: {e}")))?;

    if !query_params.is_empty() {
        let query = query_params
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }
    Ok(url)
}

/// Percent-encode everything outside RFC 3986 unreserved characters.
fn encode_component(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn http_client(accept_invalid_certs: bool) -> Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| {
            OpenApiToolsError::Config(format!(
                "HTTP client cannot be built: {}",
                sanitize_reqwest_error(&e)
            ))
        })
}

/// Scalar rendering for path, query and header values.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

// ============================================================================
// Response handling
// ============================================================================

async fn read_body_limited(mut response: reqwest::Response) -> Result<Vec<u8>> {
    if let Some(len) = response.content_length()
        && len > MAX_RESPONSE_BYTES as u64
    {
        return Err(OpenApiToolsError::Http(format!(
            "upstream body of {len} bytes is over the {MAX_RESPONSE_BYTES} byte cap"
        )));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| OpenApiToolsError::Request(sanitize_reqwest_error(&e)))?
    {
        if out.len().saturating_add(chunk.len()) > MAX_RESPONSE_BYTES {
            return Err(OpenApiToolsError::Http(format!(
                "upstream body is over the {MAX_RESPONSE_BYTES} byte cap"
            )));
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

fn is_image_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.parse::<Mime>().ok())
        .is_some_and(|m| m.type_() == mime::IMAGE)
}

/// JSON if it parses, else text, else a base64 envelope for binary bodies.
fn parse_body(bytes: &[u8], content_type: Option<&str>) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())),
        Err(_) => json!({
            "encoding": "base64",
            "mimeType": content_type,
            "data": base64::engine::general_purpose::STANDARD.encode(bytes),
        }),
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

// ============================================================================
// Tests
// ============================================================================
