use crate::credential::{AccessToken, TokenCredential};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use toto_bearer_auth::Credential;

/// Tokens are refreshed this long before they expire.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Hands out bearer tokens for one scope, refreshing them shortly before expiry.
///
/// Concurrent callers wait on the same refresh instead of each hitting the credential.
pub struct BearerTokenProvider {
    credential: Arc<dyn TokenCredential>,
    scope: String,
    cached: Mutex<Option<AccessToken>>,
}

impl BearerTokenProvider {
    pub fn new(credential: Arc<dyn TokenCredential>, scope: impl Into<String>) -> Self {
        Self {
            credential,
            scope: scope.into(),
            cached: Mutex::new(None),
        }
    }

    /// A token valid for at least [`REFRESH_MARGIN`].
    ///
    /// # Errors
    ///
    /// Returns the credential's error when a refresh is needed and fails.
    pub async fn token(&self) -> Result<Credential> {
        Ok(self.access_token().await?.token)
    }

    /// Like [`Self::token`], with the expiry.
    ///
    /// # Errors
    ///
    /// Returns the credential's error when a refresh is needed and fails.
    pub async fn access_token(&self) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && !token.expires_within(REFRESH_MARGIN)
        {
            return Ok(token.clone());
        }

        tracing::debug!(
            credential = self.credential.name(),
            scope = %self.scope,
            "refreshing bearer token"
        );
        let fresh = self.credential.get_token(&[self.scope.as_str()]).await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}
