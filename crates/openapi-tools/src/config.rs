//! Per-source configuration, deserialized from the server's YAML config (camelCase keys).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One `OpenAPI` document exposed as a set of MCP tools.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerConfig {
    /// URL or local path of the document (JSON or YAML).
    pub spec: String,

    /// Expected `sha256:<hex>` digest of the document.
    #[serde(default)]
    pub spec_hash: Option<String>,

    /// What to do when `spec_hash` does not match.
    #[serde(default)]
    pub spec_hash_policy: SpecHashPolicy,

    /// API base URL. When unset, the document's first `servers` entry is used.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub auth: UpstreamAuth,

    /// Which operations become tools without an explicit entry in `endpoints`.
    #[serde(default)]
    pub auto_discover: AutoDiscover,

    /// Per-operation overrides, keyed by path then lowercase method.
    #[serde(default)]
    pub endpoints: HashMap<String, HashMap<String, EndpointOverride>>,

    #[serde(default)]
    pub defaults: CallDefaults,

    /// Skip TLS certificate verification for spec fetches and API calls.
    ///
    /// Only meant for development hosts with self-signed certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl ApiServerConfig {
    /// Minimal config: auto-discover everything in `spec`, forward the caller's credential.
    #[must_use]
    pub fn forwarding(spec: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            spec: spec.into(),
            spec_hash: None,
            spec_hash_policy: SpecHashPolicy::default(),
            base_url,
            auth: UpstreamAuth::ForwardCaller,
            auto_discover: AutoDiscover::default(),
            endpoints: HashMap::new(),
            defaults: CallDefaults::default(),
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpecHashPolicy {
    /// Refuse to start the source.
    #[default]
    Fail,
    /// Log and continue.
    Warn,
    /// Skip the check.
    Ignore,
}

/// Outbound authentication for API calls.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UpstreamAuth {
    #[default]
    None,
    /// Static `Authorization: Bearer <token>`.
    Bearer { token: String },
    /// Static custom header.
    Header { name: String, value: String },
    /// Static query parameter.
    Query { name: String, value: String },
    /// Forward the bearer credential the MCP caller presented.
    ForwardCaller,
}

/// `true`/`false`, or glob filters over `"METHOD /path"` where exclude wins.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AutoDiscover {
    All(bool),
    Filtered {
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
}

impl Default for AutoDiscover {
    fn default() -> Self {
        Self::All(true)
    }
}

impl AutoDiscover {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::All(true) | Self::Filtered { .. })
    }

    #[must_use]
    pub fn include_patterns(&self) -> &[String] {
        if let Self::Filtered { include, .. } = self {
            include
        } else {
            &[]
        }
    }

    #[must_use]
    pub fn exclude_patterns(&self) -> &[String] {
        if let Self::Filtered { exclude, .. } = self {
            exclude
        } else {
            &[]
        }
    }
}

/// Explicit mapping of one operation to a tool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointOverride {
    /// Tool name to expose instead of the `operationId`.
    pub tool: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Keyed by the parameter's name in the document.
    #[serde(default)]
    pub params: HashMap<String, ParamOverride>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParamOverride {
    /// Argument name in the tool's input schema.
    #[serde(default)]
    pub rename: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Used when the caller omits the argument; makes it optional.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub required: Option<bool>,
}

/// Applied to every call of the source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDefaults {
    /// Seconds; `0` disables the timeout, unset uses the server-wide call timeout.
    #[serde(default)]
    pub timeout: Option<u64>,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_with_camel_case_keys() {
        let cfg: ApiServerConfig = serde_yaml::from_str(
            r"
spec: https://api.example.com/openapi.json
baseUrl: https://api.example.com/v1
auth:
  type: forwardCaller
autoDiscover:
  include: ['GET *']
  exclude: ['GET /internal/*']
defaults:
  timeout: 5
  headers:
    Accept: application/json
acceptInvalidCerts: true
specHash: sha256:abcd
specHashPolicy: warn
",
        )
        .unwrap();

        assert_eq!(cfg.base_url.as_deref(), Some("https://api.example.com/v1"));
        assert_eq!(cfg.auth, UpstreamAuth::ForwardCaller);
        assert_eq!(cfg.auto_discover.include_patterns(), ["GET *".to_string()]);
        assert_eq!(
            cfg.auto_discover.exclude_patterns(),
            ["GET /internal/*".to_string()]
        );
        assert_eq!(cfg.defaults.timeout, Some(5));
        assert!(cfg.accept_invalid_certs);
        assert_eq!(cfg.spec_hash.as_deref(), Some("sha256:abcd"));
        assert_eq!(cfg.spec_hash_policy, SpecHashPolicy::Warn);
    }

    #[test]
    fn defaults_discover_everything_without_auth() {
        let cfg: ApiServerConfig = serde_yaml::from_str("spec: ./openapi.yaml").unwrap();
        assert!(cfg.auto_discover.is_enabled());
        assert_eq!(cfg.auth, UpstreamAuth::None);
        assert!(!cfg.accept_invalid_certs);
        assert_eq!(cfg.spec_hash_policy, SpecHashPolicy::Fail);

        let off: AutoDiscover = serde_yaml::from_str("false").unwrap();
        assert!(!off.is_enabled());
    }

    #[test]
    fn static_bearer_auth_parses() {
        let auth: UpstreamAuth = serde_yaml::from_str("type: bearer\ntoken: t0k").unwrap();
        assert_eq!(
            auth,
            UpstreamAuth::Bearer {
                token: "t0k".to_string()
            }
        );
    }
}
