//! Azure OpenAI chat completions authenticated with Microsoft Entra ID.
//!
//! [`credential::DefaultAzureCredential`] finds a token source, [`provider::BearerTokenProvider`]
//! keeps a fresh token for the Cognitive Services scope, and [`client::AzureOpenAiClient`]
//! calls the deployment's chat completions endpoint, plain or streamed.

pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod provider;

pub use client::{AzureOpenAiClient, ChatCompletion, ChatMessage};
pub use config::AzureOpenAiConfig;
pub use credential::{
    AccessToken, AzureCliCredential, COGNITIVE_SERVICES_SCOPE, ClientSecretCredential,
    DefaultAzureCredential, EnvironmentTokenCredential, TokenCredential,
};
pub use error::{AzureError, Result};
pub use provider::BearerTokenProvider;
