//! Microsoft Entra ID token sources.
//!
//! Each source reports [`AzureError::CredentialUnavailable`] when it is not configured on this
//! machine, so [`DefaultAzureCredential`] can move on to the next one.

use crate::error::{AzureError, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use toto_bearer_auth::Credential;

/// Scope for Azure OpenAI (Cognitive Services) data-plane calls.
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// A bearer token and its expiry (unix seconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: Credential,
    pub expires_on: i64,
}

impl AccessToken {
    /// True if the token is expired or expires within `margin`.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        let margin = i64::try_from(margin.as_secs()).unwrap_or(i64::MAX);
        Utc::now().timestamp().saturating_add(margin) >= self.expires_on
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Short name used in logs and chained error messages.
    fn name(&self) -> &'static str;

    /// Obtain a token for `scopes`.
    ///
    /// # Errors
    ///
    /// [`AzureError::CredentialUnavailable`] when this source is not configured; other variants
    /// when it is configured but fails.
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken>;
}

type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Environment token
// ============================================================================

/// A pre-issued token from `AZURE_OPENAI_AD_TOKEN`.
///
/// The expiry is unknown, so it is assumed to be an hour from when it was read.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentTokenCredential {
    token: Option<Credential>,
}

impl EnvironmentTokenCredential {
    pub const ENV: &'static str = "AZURE_OPENAI_AD_TOKEN";

    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(Credential::new(token)),
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(&process_env)
    }

    fn from_lookup(env: EnvLookup<'_>) -> Self {
        Self {
            token: env(Self::ENV).map(Credential::new),
        }
    }
}

#[async_trait]
impl TokenCredential for EnvironmentTokenCredential {
    fn name(&self) -> &'static str {
        "EnvironmentTokenCredential"
    }

    async fn get_token(&self, _scopes: &[&str]) -> Result<AccessToken> {
        let token = self.token.clone().ok_or_else(|| {
            AzureError::CredentialUnavailable(format!("{} is not set", Self::ENV))
        })?;
        Ok(AccessToken {
            token,
            expires_on: Utc::now().timestamp() + 3600,
        })
    }
}

// ============================================================================
// Client secret (OAuth2 client credentials)
// ============================================================================

#[derive(Debug, Clone)]
struct ClientSecretSettings {
    tenant_id: String,
    client_id: String,
    client_secret: Credential,
    authority_host: String,
}

/// Service principal sign-in with a client secret.
#[derive(Debug, Clone)]
pub struct ClientSecretCredential {
    settings: Option<ClientSecretSettings>,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

impl ClientSecretCredential {
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authority_host: Option<String>,
    ) -> Self {
        Self {
            settings: Some(ClientSecretSettings {
                tenant_id: tenant_id.into(),
                client_id: client_id.into(),
                client_secret: Credential::new(client_secret),
                authority_host: authority_host
                    .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            }),
            http: reqwest::Client::new(),
        }
    }

    /// From `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` and optionally
    /// `AZURE_AUTHORITY_HOST`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(&process_env)
    }

    fn from_lookup(env: EnvLookup<'_>) -> Self {
        let settings = match (
            env("AZURE_TENANT_ID"),
            env("AZURE_CLIENT_ID"),
            env("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(secret)) => Some(ClientSecretSettings {
                tenant_id,
                client_id,
                client_secret: Credential::new(secret),
                authority_host: env("AZURE_AUTHORITY_HOST")
                    .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            }),
            _ => None,
        };
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }

    fn token_url(settings: &ClientSecretSettings) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            settings.authority_host.trim_end_matches('/'),
            settings.tenant_id
        )
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    fn name(&self) -> &'static str {
        "ClientSecretCredential"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let Some(settings) = &self.settings else {
            return Err(AzureError::CredentialUnavailable(
                "AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET are not all set"
                    .to_string(),
            ));
        };

        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", settings.client_id.as_str()),
            ("client_secret", settings.client_secret.expose()),
            ("scope", scope.as_str()),
        ];
        let resp = self
            .http
            .post(Self::token_url(settings))
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let err: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            return Err(AzureError::Credential(format!(
                "token endpoint returned {status}: {} {}",
                err.error, err.error_description
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        tracing::debug!(expires_in = parsed.expires_in, "obtained token via client secret");
        Ok(AccessToken {
            token: Credential::new(parsed.access_token),
            expires_on: Utc::now().timestamp() + parsed.expires_in,
        })
    }
}

// ============================================================================
// Azure CLI
// ============================================================================

/// Token of the user logged in with `az login`.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: String,
    timeout: Duration,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self {
            program: if cfg!(windows) { "az.cmd" } else { "az" }.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Unix seconds; newer CLI versions only.
    #[serde(default, rename = "expires_on")]
    expires_on_unix: Option<i64>,
    /// Local time, e.g. `2024-05-01 13:45:00.000000`.
    #[serde(default)]
    expires_on: Option<String>,
}

/// `https://cognitiveservices.azure.com/.default` -> `https://cognitiveservices.azure.com`
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

fn parse_cli_token(stdout: &[u8]) -> Result<AccessToken> {
    let parsed: CliToken = serde_json::from_slice(stdout)?;
    let expires_on = match (parsed.expires_on_unix, parsed.expires_on.as_deref()) {
        (Some(unix), _) => unix,
        (None, Some(local)) => {
            let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f").map_err(|e| {
                AzureError::Credential(format!("unexpected expiresOn '{local}': {e}"))
            })?;
            Local
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| AzureError::Credential(format!("ambiguous expiresOn '{local}'")))?
                .timestamp()
        }
        (None, None) => {
            return Err(AzureError::Credential(
                "Azure CLI output has no expiry".to_string(),
            ));
        }
    };
    Ok(AccessToken {
        token: Credential::new(parsed.access_token),
        expires_on,
    })
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &'static str {
        "AzureCliCredential"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let [scope] = scopes else {
            return Err(AzureError::Credential(
                "Azure CLI accepts exactly one scope".to_string(),
            ));
        };

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args([
            "account",
            "get-access-token",
            "--resource",
            scope_to_resource(scope),
            "--output",
            "json",
        ])
        .kill_on_drop(true);
        let run = cmd.output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Err(_) => {
                return Err(AzureError::Credential(format!(
                    "Azure CLI did not answer within {}s",
                    self.timeout.as_secs()
                )));
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AzureError::CredentialUnavailable(
                    "Azure CLI not found on PATH".to_string(),
                ));
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(out)) => out,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("az login") {
                return Err(AzureError::CredentialUnavailable(
                    "not logged in; run 'az login'".to_string(),
                ));
            }
            return Err(AzureError::Credential(format!("Azure CLI failed: {stderr}")));
        }

        parse_cli_token(&output.stdout)
    }
}

// ============================================================================
// Default chain
// ============================================================================

/// Environment token, then client secret, then Azure CLI. The first token wins.
pub struct DefaultAzureCredential {
    sources: Vec<Box<dyn TokenCredential>>,
}

impl DefaultAzureCredential {
    #[must_use]
    pub fn new() -> Self {
        Self::with_sources(vec![
            Box::new(EnvironmentTokenCredential::from_env()),
            Box::new(ClientSecretCredential::from_env()),
            Box::new(AzureCliCredential::default()),
        ])
    }

    #[must_use]
    pub fn with_sources(sources: Vec<Box<dyn TokenCredential>>) -> Self {
        Self { sources }
    }
}

impl Default for DefaultAzureCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCredential for DefaultAzureCredential {
    fn name(&self) -> &'static str {
        "DefaultAzureCredential"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let mut attempts = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.get_token(scopes).await {
                Ok(token) => {
                    tracing::info!(source = source.name(), "obtained Entra ID token");
                    return Ok(token);
                }
                Err(e) => {
                    if e.is_unavailable() {
                        tracing::debug!(source = source.name(), error = %e, "credential skipped");
                    } else {
                        tracing::warn!(source = source.name(), error = %e, "credential failed");
                    }
                    attempts.push(format!("{}: {e}", source.name()));
                }
            }
        }
        Err(AzureError::CredentialUnavailable(format!(
            "no credential produced a token ({})",
            attempts.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[tokio::test]
    async fn environment_token_is_unavailable_when_unset() {
        let cred = EnvironmentTokenCredential::from_lookup(&lookup(&[]));
        let err = cred.get_token(&[COGNITIVE_SERVICES_SCOPE]).await.unwrap_err();
        assert!(err.is_unavailable());

        let cred = EnvironmentTokenCredential::from_lookup(&lookup(&[(
            EnvironmentTokenCredential::ENV,
            "tok",
        )]));
        let token = cred.get_token(&[COGNITIVE_SERVICES_SCOPE]).await.unwrap();
        assert_eq!(token.token.expose(), "tok");
        assert!(!token.expires_within(Duration::from_secs(300)));
    }

    #[test]
    fn client_secret_needs_all_three_variables() {
        let partial = ClientSecretCredential::from_lookup(&lookup(&[
            ("AZURE_TENANT_ID", "t"),
            ("AZURE_CLIENT_ID", "c"),
        ]));
        assert!(partial.settings.is_none());

        let full = ClientSecretCredential::from_lookup(&lookup(&[
            ("AZURE_TENANT_ID", "tenant"),
            ("AZURE_CLIENT_ID", "c"),
            ("AZURE_CLIENT_SECRET", "s"),
        ]));
        let settings = full.settings.as_ref().unwrap();
        assert_eq!(
            ClientSecretCredential::token_url(settings),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn cli_output_with_unix_expiry() {
        let t = parse_cli_token(
            br#"{"accessToken":"abc","expiresOn":"2030-01-01 00:00:00.000000","expires_on":1893456000,"tokenType":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(t.token.expose(), "abc");
        assert_eq!(t.expires_on, 1_893_456_000);
    }

    #[test]
    fn cli_output_with_local_expiry_only() {
        let t =
            parse_cli_token(br#"{"accessToken":"abc","expiresOn":"2030-01-01 00:00:00.000000"}"#)
                .unwrap();
        // Within a day of the UTC instant, whatever the local offset.
        assert!((t.expires_on - 1_893_456_000).abs() <= 86_400);

        assert!(parse_cli_token(br#"{"accessToken":"abc"}"#).is_err());
    }

    #[test]
    fn scope_maps_to_cli_resource() {
        assert_eq!(
            scope_to_resource(COGNITIVE_SERVICES_SCOPE),
            "https://cognitiveservices.azure.com"
        );
    }

    #[tokio::test]
    async fn missing_cli_is_unavailable() {
        let cli = AzureCliCredential {
            program: "definitely-not-the-azure-cli".to_string(),
            timeout: Duration::from_secs(5),
        };
        let err = cli.get_token(&[COGNITIVE_SERVICES_SCOPE]).await.unwrap_err();
        assert!(err.is_unavailable(), "{err}");
    }

    #[tokio::test]
    async fn chain_returns_first_token_and_reports_every_failure() {
        let empty = || -> Box<dyn TokenCredential> {
            Box::new(EnvironmentTokenCredential::default())
        };

        let chain = DefaultAzureCredential::with_sources(vec![
            empty(),
            Box::new(EnvironmentTokenCredential::new("second")),
        ]);
        let t = chain.get_token(&[COGNITIVE_SERVICES_SCOPE]).await.unwrap();
        assert_eq!(t.token.expose(), "second");

        let chain = DefaultAzureCredential::with_sources(vec![empty(), empty()]);
        let err = chain.get_token(&[COGNITIVE_SERVICES_SCOPE]).await.unwrap_err();
        let msg = err.to_string();
        assert!(err.is_unavailable());
        assert_eq!(msg.matches("EnvironmentTokenCredential").count(), 2, "{msg}");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let cred = ClientSecretCredential::new("t", "c", "super-secret", None);
        assert!(!format!("{cred:?}").contains("super-secret"));
    }
}
