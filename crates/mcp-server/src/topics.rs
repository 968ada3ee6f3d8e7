//! Client for the topics API behind `get_tome_topics`.

use crate::error::{Result, ServerError};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use toto_bearer_auth::Credential;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "string_or_scalar")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct TopicsResponse {
    #[serde(default)]
    topics: Vec<Topic>,
}

/// Numeric ids are accepted and kept as their decimal text.
fn string_or_scalar<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct TopicsClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl TopicsClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// `GET {base}/topics` on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Http`] on transport failure or a non-2xx status, and
    /// [`ServerError::Json`] if the body is not a topics document.
    pub async fn list(&self, caller: &Credential) -> Result<Vec<Topic>> {
        let url = format!("{}/topics", self.base_url);
        tracing::debug!(url = %url, "fetching topics");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(caller.expose())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ServerError::Http(format!("topics API unreachable: {e}")))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ServerError::Http(format!("topics API body: {e}")))?;
        if !status.is_success() {
            return Err(ServerError::Http(format!(
                "topics API returned {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        let parsed: TopicsResponse = serde_json::from_slice(&body)?;
        tracing::debug!(count = parsed.topics.len(), "fetched topics");
        Ok(parsed.topics)
    }
}
