//! Command-line flags and the optional YAML config file.

use crate::error::{Result, ServerError};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toto_openapi_tools::config::ApiServerConfig;

/// Name of the source built from `--openapi-spec`.
pub const CLI_SOURCE_NAME: &str = "api";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// MCP server exposing bearer-authenticated tools over streamable HTTP.
#[derive(Debug, Clone, Parser)]
#[command(name = "toto-mcp-server", version, about)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, env = "TOTO_MCP_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// HTTP path of the MCP endpoint.
    #[arg(long, env = "TOTO_MCP_PATH", default_value = "/mcp")]
    pub path: String,

    /// YAML config file (server name, topics API, `OpenAPI` sources).
    #[arg(long, env = "TOTO_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// `OpenAPI` spec (URL or file) to expose as tools; calls forward the caller's bearer token.
    #[arg(long, env = "TOTO_MCP_OPENAPI_SPEC")]
    pub openapi_spec: Option<String>,

    /// Base URL for `--openapi-spec` calls (defaults to the spec's first server).
    #[arg(long, env = "TOTO_MCP_OPENAPI_BASE_URL", requires = "openapi_spec")]
    pub openapi_base_url: Option<String>,

    /// Base URL of the topics API used by `get_tome_topics`.
    #[arg(long, env = "TOTO_MCP_TOPICS_BASE_URL")]
    pub topics_base_url: Option<String>,

    /// Reject MCP requests without a well-formed bearer credential (HTTP 401).
    #[arg(long, env = "TOTO_MCP_REQUIRE_AUTH")]
    pub require_auth: bool,

    /// Timeout for outbound API calls, in seconds.
    #[arg(long, env = "TOTO_MCP_CALL_TIMEOUT_SECS", default_value_t = 30)]
    pub call_timeout_secs: u64,

    /// Timeout for loading each `OpenAPI` source at startup, in seconds.
    #[arg(long, env = "TOTO_MCP_STARTUP_TIMEOUT_SECS", default_value_t = 30)]
    pub startup_timeout_secs: u64,

    #[arg(long, env = "TOTO_MCP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "TOTO_MCP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// YAML config file.
///
/// ```yaml
/// name: Toto Integration Example
/// topicsBaseUrl: https://api.example.com/tometopics
/// openapi:
///   events:
///     spec: https://api.example.com/openapi.json
///     auth: { type: forwardCaller }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub topics_base_url: Option<String>,
    #[serde(default)]
    pub openapi: BTreeMap<String, ApiServerConfig>,
}

impl FileConfig {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML for this shape.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read config '{}': {e}", path.display()))
        })?;
        serde_yaml::from_str(&raw).map_err(|e| {
            ServerError::Config(format!("failed to parse config '{}': {e}", path.display()))
        })
    }
}

/// Effective settings after merging flags over the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub name: String,
    pub bind: SocketAddr,
    pub path: String,
    pub require_auth: bool,
    pub topics_base_url: Option<String>,
    pub openapi: BTreeMap<String, ApiServerConfig>,
    pub call_timeout: Duration,
    pub startup_timeout: Duration,
}

impl Settings {
    pub const DEFAULT_NAME: &'static str = "Toto Integration Example";

    /// Merge the CLI over the config file (flags win).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable, the MCP path is invalid, or
    /// `--openapi-spec` clashes with a file-configured source of the same name.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(p) => FileConfig::load(p)?,
            None => FileConfig::default(),
        };

        if !cli.path.starts_with('/') || cli.path.len() < 2 {
            return Err(ServerError::Config(format!(
                "MCP path must start with '/' and not be the root, got '{}'",
                cli.path
            )));
        }

        let mut openapi = file.openapi;
        if let Some(spec) = &cli.openapi_spec {
            if openapi.contains_key(CLI_SOURCE_NAME) {
                return Err(ServerError::Config(format!(
                    "--openapi-spec conflicts with config source '{CLI_SOURCE_NAME}'"
                )));
            }
            openapi.insert(
                CLI_SOURCE_NAME.to_string(),
                ApiServerConfig::forwarding(spec.clone(), cli.openapi_base_url.clone()),
            );
        }

        Ok(Self {
            name: file.name.unwrap_or_else(|| Self::DEFAULT_NAME.to_string()),
            bind: cli.bind,
            path: cli.path.clone(),
            require_auth: cli.require_auth,
            topics_base_url: cli.topics_base_url.clone().or(file.topics_base_url),
            openapi,
            call_timeout: Duration::from_secs(cli.call_timeout_secs),
            startup_timeout: Duration::from_secs(cli.startup_timeout_secs),
        })
    }
}
