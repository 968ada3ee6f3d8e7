use anyhow::Context as _;
use clap::Parser as _;
use tokio_util::sync::CancellationToken;
use toto_mcp_server::app;
use toto_mcp_server::config::{Cli, Settings};
use toto_mcp_server::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format)?;

    let settings = Settings::resolve(&cli).context("resolve settings")?;
    let server = app::build_server(&settings)
        .await
        .context("build MCP server")?;

    let shutdown = CancellationToken::new();
    app::spawn_signal_handler(shutdown.clone());

    let router = app::router(
        server.clone(),
        &settings.path,
        settings.require_auth,
        &shutdown,
    );
    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("bind {}", settings.bind))?;

    tracing::info!(
        name = %server.name(),
        bind = %settings.bind,
        path = %settings.path,
        require_auth = settings.require_auth,
        tools = server.tools().len(),
        "MCP server listening"
    );

    app::serve(listener, router, shutdown).await?;
    tracing::info!("MCP server stopped");
    Ok(())
}
