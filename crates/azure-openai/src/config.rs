use crate::error::{AzureError, Result};

pub const DEFAULT_API_VERSION: &str = "2024-02-15-preview";
pub const DEFAULT_DEPLOYMENT: &str = "gpt5";

/// Where to send chat completions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureOpenAiConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com/`.
    pub endpoint: String,
    pub api_version: String,
    pub deployment: String,
}

impl AzureOpenAiConfig {
    /// From `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_API_VERSION` and `DEPLOYMENT_NAME`, after
    /// loading `.env` from the working directory if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`AzureError::Config`] if the endpoint is missing or not an http(s) URL.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |k: &str| env(k).filter(|v| !v.trim().is_empty());

        let endpoint = non_empty("AZURE_OPENAI_ENDPOINT").ok_or_else(|| {
            AzureError::Config("AZURE_OPENAI_ENDPOINT is not set".to_string())
        })?;
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(AzureError::Config(format!(
                "AZURE_OPENAI_ENDPOINT must be an http(s) URL, got '{endpoint}'"
            )));
        }

        Ok(Self {
            endpoint,
            api_version: non_empty("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            deployment: non_empty("DEPLOYMENT_NAME")
                .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
        })
    }

    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={version}`
    #[must_use]
    pub fn chat_completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<AzureOpenAiConfig> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        AzureOpenAiConfig::from_lookup(|k| map.get(k).map(|v| (*v).to_string()))
    }

    #[test]
    fn defaults_apply_when_only_the_endpoint_is_set() {
        let cfg = from(&[("AZURE_OPENAI_ENDPOINT", "https://res.openai.azure.com/")]).unwrap();
        assert_eq!(cfg.api_version, DEFAULT_API_VERSION);
        assert_eq!(cfg.deployment, DEFAULT_DEPLOYMENT);
    }

    #[test]
    fn url_has_exactly_one_slash_before_openai() {
        for endpoint in ["https://res.openai.azure.com/", "https://res.openai.azure.com"] {
            let cfg = from(&[
                ("AZURE_OPENAI_ENDPOINT", endpoint),
                ("DEPLOYMENT_NAME", "gpt-4o"),
                ("AZURE_OPENAI_API_VERSION", "2024-10-21"),
            ])
            .unwrap();
            assert_eq!(
                cfg.chat_completions_url(),
                "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-10-21"
            );
        }
    }

    #[test]
    fn endpoint_is_required() {
        assert!(matches!(from(&[]), Err(AzureError::Config(_))));
        assert!(matches!(
            from(&[("AZURE_OPENAI_ENDPOINT", "res.openai.azure.com")]),
            Err(AzureError::Config(_))
        ));
    }
}
