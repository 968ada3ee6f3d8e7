//! Error types for `toto-bearer-auth`.

use thiserror::Error;

/// Why a bearer credential could not be extracted.
///
/// Both variants are client-input errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationError {
    /// No `Authorization` header present.
    #[error("Authorization header missing")]
    Missing,

    /// Header present but not exactly `Bearer <token>`.
    #[error("Invalid Authorization header format")]
    Malformed,
}

impl AuthorizationError {
    /// Stable machine-readable code (used in HTTP error bodies).
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            AuthorizationError::Missing => "missing_authorization",
            AuthorizationError::Malformed => "malformed_authorization",
        }
    }

    /// Neither variant goes away by retrying the same request.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        false
    }
}

/// Result type alias for credential extraction.
pub type Result<T> = std::result::Result<T, AuthorizationError>;
