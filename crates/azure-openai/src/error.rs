use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// No credential source is configured, or every source failed.
    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// A configured credential source failed to produce a token.
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("HTTP error: {0}")]
    Http(String),

    /// Azure OpenAI answered with a non-2xx status.
    #[error("Azure OpenAI returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AzureError {
    /// Whether the chain may try the next credential source after this error.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AzureError::CredentialUnavailable(_))
    }
}

impl From<reqwest::Error> for AzureError {
    fn from(e: reqwest::Error) -> Self {
        AzureError::Http(e.without_url().to_string())
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;
