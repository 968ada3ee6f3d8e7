use crate::error::{AuthorizationError, Result};
use axum::http::HeaderMap;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Header name looked up by [`extract_bearer_token`].
pub const AUTHORIZATION: &str = "Authorization";

/// The only accepted authorization scheme (compared case-sensitively).
pub const BEARER_SCHEME: &str = "Bearer";

/// Read-only view of one request's headers.
///
/// Name matching is whatever the implementor defines: [`HeaderMap`] is case-insensitive,
/// the plain map impls use the exact key.
pub trait HeaderSet {
    /// Raw value bytes of the header called `name`, if present.
    fn header(&self, name: &str) -> Option<&[u8]>;
}

impl HeaderSet for HeaderMap {
    fn header(&self, name: &str) -> Option<&[u8]> {
        self.get(name).map(axum::http::HeaderValue::as_bytes)
    }
}

impl HeaderSet for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&[u8]> {
        self.get(name).map(String::as_bytes)
    }
}

impl HeaderSet for BTreeMap<String, String> {
    fn header(&self, name: &str) -> Option<&[u8]> {
        self.get(name).map(String::as_bytes)
    }
}

impl<T: HeaderSet + ?Sized> HeaderSet for &T {
    fn header(&self, name: &str) -> Option<&[u8]> {
        (**self).header(name)
    }
}

/// An opaque bearer credential taken from one request.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, e.g. for an outbound `Authorization: Bearer` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

/// Extract the credential from an `Authorization: Bearer <token>` header.
///
/// The header value is split on whitespace; it must yield exactly two tokens, the first of
/// which is the literal `Bearer`.
///
/// # Errors
///
/// - [`AuthorizationError::Missing`] if there is no `Authorization` header.
/// - [`AuthorizationError::Malformed`] if the value is not UTF-8, has a token count other than
///   two, or uses a scheme other than `Bearer`.
pub fn extract_bearer_token<H: HeaderSet + ?Sized>(headers: &H) -> Result<Credential> {
    let raw = headers
        .header(AUTHORIZATION)
        .ok_or(AuthorizationError::Missing)?;
    let value = std::str::from_utf8(raw).map_err(|_| AuthorizationError::Malformed)?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) => Ok(Credential::new(token)),
        _ => Err(AuthorizationError::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_authorization(value: &str) -> HashMap<String, String> {
        HashMap::from([(AUTHORIZATION.to_string(), value.to_string())])
    }

    #[test]
    fn missing_header_is_reported() {
        let headers: HashMap<String, String> =
            HashMap::from([("Accept".to_string(), "application/json".to_string())]);
        assert_eq!(
            extract_bearer_token(&headers),
            Err(AuthorizationError::Missing)
        );
        assert_eq!(
            extract_bearer_token(&HeaderMap::new()),
            Err(AuthorizationError::Missing)
        );
    }

    #[test]
    fn bearer_token_is_returned() {
        let cred = extract_bearer_token(&with_authorization("Bearer abc123")).unwrap();
        assert_eq!(cred.expose(), "abc123");
    }

    #[test]
    fn wrong_scheme_is_malformed() {
        assert_eq!(
            extract_bearer_token(&with_authorization("Basic abc123")),
            Err(AuthorizationError::Malformed)
        );
        // The scheme literal is case-sensitive.
        assert_eq!(
            extract_bearer_token(&with_authorization("bearer abc123")),
            Err(AuthorizationError::Malformed)
        );
    }

    #[test]
    fn scheme_without_token_is_malformed() {
        assert_eq!(
            extract_bearer_token(&with_authorization("Bearer")),
            Err(AuthorizationError::Malformed)
        );
        assert_eq!(
            extract_bearer_token(&with_authorization("")),
            Err(AuthorizationError::Malformed)
        );
    }

    #[test]
    fn extra_tokens_are_malformed() {
        assert_eq!(
            extract_bearer_token(&with_authorization("Bearer abc 123")),
            Err(AuthorizationError::Malformed)
        );
    }

    #[test]
    fn surrounding_and_repeated_whitespace_is_ignored() {
        let cred = extract_bearer_token(&with_authorization("  Bearer \t abc123  ")).unwrap();
        assert_eq!(cred.expose(), "abc123");
    }

    #[test]
    fn plain_maps_use_the_exact_key() {
        let headers = HashMap::from([("authorization".to_string(), "Bearer abc".to_string())]);
        assert_eq!(
            extract_bearer_token(&headers),
            Err(AuthorizationError::Missing)
        );
    }

    #[test]
    fn header_map_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers).unwrap().expose(), "abc123");
    }

    #[test]
    fn non_utf8_value_is_malformed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap(),
        );
        assert_eq!(
            extract_bearer_token(&headers),
            Err(AuthorizationError::Malformed)
        );
    }

    #[test]
    fn extraction_is_repeatable() {
        let headers = with_authorization("Bearer abc123");
        let first = extract_bearer_token(&headers);
        let second = extract_bearer_token(&headers);
        assert_eq!(first, second);

        let bad = with_authorization("Basic abc123");
        assert_eq!(extract_bearer_token(&bad), extract_bearer_token(&bad));
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let cred = Credential::new("super-secret");
        let dbg = format!("{cred:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("redacted"));
    }
}
