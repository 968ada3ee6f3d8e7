use thiserror::Error;
use toto_bearer_auth::AuthorizationError;

/// Everything that can go wrong while loading a document or calling one of its operations.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    #[error("invalid tool source config: {0}")]
    Config(String),

    /// The source did not become ready (timeout, discovery failure).
    #[error("tool source failed to start: {0}")]
    Startup(String),

    /// Bad call: unknown tool, missing argument, source not started.
    #[error("tool call rejected: {0}")]
    Runtime(String),

    /// Upstream answered non-2xx, or its body was too large.
    #[error("upstream HTTP error: {0}")]
    Http(String),

    /// Document problems: `$ref`s, base URL, hash mismatch.
    #[error("OpenAPI document error: {0}")]
    OpenApi(String),

    #[error("could not fetch OpenAPI document '{url}': {message}")]
    OpenApiSpecFetch { url: String, message: String },

    #[error("could not read OpenAPI document '{path}': {source}")]
    OpenApiSpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse OpenAPI document '{location}': {source}")]
    OpenApiSpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Two arguments of one operation map to the same tool argument name.
    #[error("argument name collision: {0}")]
    ParamCollision(String),

    /// The source forwards the caller's credential and the caller has none.
    #[error("caller credential required: {0}")]
    Auth(#[from] AuthorizationError),

    /// Transport failure (connect, timeout). The message has its URL query redacted.
    #[error("upstream request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
