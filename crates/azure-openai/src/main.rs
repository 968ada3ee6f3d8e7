use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt as _;
use std::io::Write as _;
use std::sync::Arc;
use toto_azure_openai::{
    AzureOpenAiClient, AzureOpenAiConfig, BearerTokenProvider, COGNITIVE_SERVICES_SCOPE,
    ChatMessage, DefaultAzureCredential, TokenCredential,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Call an Azure OpenAI deployment with a Microsoft Entra ID token.
///
/// Reads `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_API_VERSION` and `DEPLOYMENT_NAME` from the
/// environment or a `.env` file.
#[derive(Debug, Parser)]
#[command(name = "toto-azure-openai", version, about)]
struct Cli {
    #[arg(long, env = "TOTO_AZURE_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Obtain a token and print its expiry.
    Check,
    /// Send one prompt and print the reply.
    Chat {
        #[arg(long, default_value = "What is Azure OpenAI?")]
        prompt: String,
        #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
        system: String,
    },
    /// Send one prompt and print the reply as it streams in.
    Stream {
        #[arg(long, default_value = "Count from 1 to 5.")]
        prompt: String,
        #[arg(long)]
        system: Option<String>,
    },
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

async fn check(credential: &DefaultAzureCredential) -> bool {
    match credential.get_token(&[COGNITIVE_SERVICES_SCOPE]).await {
        Ok(token) => {
            let expires = DateTime::<Utc>::from_timestamp(token.expires_on, 0)
                .map_or_else(|| token.expires_on.to_string(), |t| t.to_rfc3339());
            println!("Successfully obtained authentication token");
            println!("Token expires at: {expires}");
            true
        }
        Err(e) => {
            eprintln!("Authentication failed: {e}");
            eprintln!("\nMake sure you're logged in via Azure CLI:\n  az login");
            false
        }
    }
}

fn messages(system: Option<String>, prompt: String) -> Vec<ChatMessage> {
    system
        .into_iter()
        .map(ChatMessage::system)
        .chain(std::iter::once(ChatMessage::user(prompt)))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let credential = Arc::new(DefaultAzureCredential::new());
    if let Command::Check = cli.command {
        if !check(&credential).await {
            std::process::exit(1);
        }
        return Ok(());
    }

    let config = AzureOpenAiConfig::from_env().context("load Azure OpenAI settings")?;
    println!("Endpoint: {}", config.endpoint);
    println!("Deployment: {}", config.deployment);

    let tokens = Arc::new(BearerTokenProvider::new(
        credential,
        COGNITIVE_SERVICES_SCOPE,
    ));
    let client = AzureOpenAiClient::new(config, tokens);

    match cli.command {
        Command::Check => {}
        Command::Chat { prompt, system } => {
            let reply = client
                .chat(&messages(Some(system), prompt))
                .await
                .context("chat completion")?;
            println!("Response: {}", reply.content().unwrap_or_default());
        }
        Command::Stream { prompt, system } => {
            let mut stream = client
                .chat_stream(&messages(system, prompt))
                .await
                .context("start streaming chat completion")?;
            print!("Streaming response: ");
            let mut stdout = std::io::stdout();
            while let Some(fragment) = stream.next().await {
                print!("{}", fragment.context("read stream")?);
                stdout.flush()?;
            }
            println!();
        }
    }
    Ok(())
}
