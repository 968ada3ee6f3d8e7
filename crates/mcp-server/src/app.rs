//! HTTP surface: `/health` plus the streamable HTTP MCP endpoint.

use crate::config::Settings;
use crate::error::{Result, ServerError};
use crate::handler::TotoMcpServer;
use crate::topics::TopicsClient;
use axum::Router;
use axum::routing::get;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use toto_openapi_tools::runtime::OpenApiToolSource;

/// Build the tool surface: start every `OpenAPI` source and wire the topics client.
///
/// # Errors
///
/// Returns an error if any `OpenAPI` source fails to start.
pub async fn build_server(settings: &Settings) -> Result<TotoMcpServer> {
    let mut sources = Vec::with_capacity(settings.openapi.len());
    for (name, cfg) in &settings.openapi {
        let source = OpenApiToolSource::build(
            name.clone(),
            cfg.clone(),
            settings.call_timeout,
            settings.startup_timeout,
        )
        .await
        .map_err(|e| ServerError::Startup(format!("OpenAPI source '{name}': {e}")))?;
        sources.push(source);
    }

    let topics = settings
        .topics_base_url
        .as_ref()
        .map(|url| TopicsClient::new(url.clone(), settings.call_timeout));

    Ok(TotoMcpServer::new(settings.name.clone(), topics, sources))
}

/// Router with `/health` and the MCP endpoint at `mcp_path`.
///
/// With `require_auth`, the MCP endpoint answers 401 before any MCP handling when the
/// request carries no well-formed bearer credential. Open MCP streams end when `shutdown` is
/// cancelled.
pub fn router(
    server: TotoMcpServer,
    mcp_path: &str,
    require_auth: bool,
    shutdown: &CancellationToken,
) -> Router {
    let config = StreamableHttpServerConfig {
        cancellation_token: shutdown.child_token(),
        ..Default::default()
    };
    let service: StreamableHttpService<TotoMcpServer, LocalSessionManager> =
        StreamableHttpService::new(
            move || Ok(server.clone()),
            LocalSessionManager::default().into(),
            config,
        );

    let mut mcp = Router::new().nest_service(mcp_path, service);
    if require_auth {
        mcp = mcp.layer(axum::middleware::from_fn(toto_bearer_auth::web::require_bearer));
    }

    Router::new().route("/health", get(health)).merge(mcp)
}

async fn health() -> &'static str {
    "ok"
}

/// Serve until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }
        tracing::info!("shutdown signal received");
        token.cancel();
    });
}
