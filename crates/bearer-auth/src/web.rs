//! HTTP surface for credential extraction: error responses, an extractor, and a middleware.

use crate::error::AuthorizationError;
use crate::extract::{Credential, extract_bearer_token};
use axum::Json;
use axum::extract::{FromRequestParts, Request};
use axum::http::{HeaderValue, StatusCode, header, request::Parts};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthorizationError {
    fn into_response(self) -> Response {
        let challenge = match self {
            AuthorizationError::Missing => HeaderValue::from_static("Bearer"),
            AuthorizationError::Malformed => {
                HeaderValue::from_static("Bearer error=\"invalid_request\"")
            }
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };

        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, challenge)],
            Json(body),
        )
            .into_response()
    }
}

/// Extractor for handlers that need the caller's credential.
///
/// Reuses the credential stored by [`require_bearer`] when that middleware ran, otherwise
/// parses the `Authorization` header itself. Rejects with 401.
#[derive(Debug, Clone)]
pub struct BearerToken(pub Credential);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthorizationError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(cred) = parts.extensions.get::<Credential>() {
            return Ok(BearerToken(cred.clone()));
        }
        extract_bearer_token(&parts.headers).map(BearerToken)
    }
}

/// Reject requests that do not carry a well-formed bearer credential.
///
/// On success the [`Credential`] is inserted into the request extensions.
///
/// ```ignore
/// let mcp = Router::new()
///     .nest_service("/mcp", service)
///     .layer(axum::middleware::from_fn(require_bearer));
/// ```
///
/// # Errors
///
/// Returns the [`AuthorizationError`] (rendered as 401) when extraction fails.
pub async fn require_bearer(mut req: Request, next: Next) -> Result<Response, AuthorizationError> {
    match extract_bearer_token(req.headers()) {
        Ok(cred) => {
            req.extensions_mut().insert(cred);
            Ok(next.run(req).await)
        }
        Err(e) => {
            tracing::debug!(
                error = %e,
                method = %req.method(),
                path = %req.uri().path(),
                "rejecting request without a bearer credential"
            );
            Err(e)
        }
    }
}
