//! Chat completions against an Azure OpenAI deployment.

use crate::config::AzureOpenAiConfig;
use crate::error::{AzureError, Result};
use crate::provider::BearerTokenProvider;
use futures::stream::BoxStream;
use futures::{StreamExt as _, TryStreamExt as _, future};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sse_stream::{Sse, SseStream};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Content of the first choice, if any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

const DONE: &str = "[DONE]";

pub struct AzureOpenAiClient {
    http: reqwest::Client,
    config: AzureOpenAiConfig,
    tokens: Arc<BearerTokenProvider>,
}

impl AzureOpenAiClient {
    pub fn new(config: AzureOpenAiConfig, tokens: Arc<BearerTokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            tokens,
        }
    }

    async fn post(&self, body: serde_json::Value) -> Result<reqwest::Response> {
        let token = self.tokens.token().await?;
        let resp = self
            .http
            .post(self.config.chat_completions_url())
            .bearer_auth(token.expose())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(AzureError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// One chat completion.
    ///
    /// # Errors
    ///
    /// Token acquisition failures, transport errors, [`AzureError::Api`] for non-2xx answers,
    /// and [`AzureError::Json`] for unexpected bodies.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatCompletion> {
        tracing::debug!(
            deployment = %self.config.deployment,
            messages = messages.len(),
            "chat completion"
        );
        let resp = self.post(json!({ "messages": messages })).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Stream the assistant's reply as content fragments.
    ///
    /// The stream ends at `data: [DONE]` or when the server closes the response. Chunks without
    /// choices or delta content are skipped.
    ///
    /// # Errors
    ///
    /// Same as [`Self::chat`] for the request itself; stream items carry
    /// [`AzureError::Stream`] or [`AzureError::Json`] for broken events.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<BoxStream<'static, Result<String>>> {
        tracing::debug!(
            deployment = %self.config.deployment,
            messages = messages.len(),
            "streaming chat completion"
        );
        let resp = self
            .post(json!({ "messages": messages, "stream": true }))
            .await?;

        Ok(SseStream::from_byte_stream(resp.bytes_stream())
            .map_err(|e| AzureError::Stream(e.to_string()))
            .try_take_while(|sse| future::ready(Ok(!is_done(sse))))
            .try_filter_map(|sse| future::ready(delta_content(&sse)))
            .boxed())
    }
}

fn is_done(sse: &Sse) -> bool {
    sse.data.as_deref().map(str::trim) == Some(DONE)
}

fn delta_content(sse: &Sse) -> Result<Option<String>> {
    let Some(data) = sse.data.as_deref().map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    let chunk: ChatCompletionChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|c| !c.is_empty()))
}
