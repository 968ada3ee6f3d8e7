use rmcp::ErrorData;
use serde_json::json;
use thiserror::Error;
use toto_bearer_auth::AuthorizationError;
use toto_openapi_tools::error::OpenApiToolsError;

/// Main error type for the MCP server.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Startup error: {0}")]
    Startup(String),

    /// Tool-level failures that are not the caller's fault.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// The upstream API answered with an error or could not be reached.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool needs the caller's bearer credential and it was missing or malformed.
    #[error("{0}")]
    Unauthorized(#[from] AuthorizationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl From<OpenApiToolsError> for ServerError {
    fn from(e: OpenApiToolsError) -> Self {
        match e {
            OpenApiToolsError::Auth(a) => ServerError::Unauthorized(a),
            OpenApiToolsError::Config(m) => ServerError::Config(m),
            OpenApiToolsError::Startup(m) => ServerError::Startup(m),
            OpenApiToolsError::Runtime(m) | OpenApiToolsError::ParamCollision(m) => {
                ServerError::InvalidArguments(m)
            }
            OpenApiToolsError::Http(m) | OpenApiToolsError::Request(m) => ServerError::Http(m),
            other => ServerError::OpenApi(other.to_string()),
        }
    }
}

impl From<ServerError> for ErrorData {
    fn from(e: ServerError) -> Self {
        match &e {
            ServerError::Unauthorized(a) => ErrorData::invalid_request(
                e.to_string(),
                Some(json!({ "code": a.code() })),
            ),
            ServerError::UnknownTool(_) | ServerError::InvalidArguments(_) => {
                ErrorData::invalid_params(e.to_string(), None)
            }
            _ => ErrorData::internal_error(e.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::ErrorCode;

    #[test]
    fn authorization_errors_become_invalid_request() {
        let data: ErrorData = ServerError::from(AuthorizationError::Missing).into();
        assert_eq!(data.code, ErrorCode::INVALID_REQUEST);
        assert_eq!(data.message, "Authorization header missing");
        assert_eq!(data.data, Some(json!({ "code": "missing_authorization" })));
    }

    #[test]
    fn forwarded_credential_failures_keep_their_kind() {
        let e = ServerError::from(OpenApiToolsError::Auth(AuthorizationError::Malformed));
        assert!(matches!(
            e,
            ServerError::Unauthorized(AuthorizationError::Malformed)
        ));
    }

    #[test]
    fn upstream_failures_are_internal_errors() {
        let e = ServerError::from(OpenApiToolsError::Http("API returned 500".to_string()));
        let data: ErrorData = e.into();
        assert_eq!(data.code, ErrorCode::INTERNAL_ERROR);

        let unknown: ErrorData = ServerError::UnknownTool("x".to_string()).into();
        assert_eq!(unknown.code, ErrorCode::INVALID_PARAMS);
    }
}
