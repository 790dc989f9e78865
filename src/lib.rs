//! mcp-proxy: an OpenAI-compatible chat-completion proxy that resolves the
//! model's tool calls against MCP servers before answering the caller.

pub mod config;
pub mod inference;
pub mod logging;
pub mod mcp_client;
pub mod proxy;

use std::sync::Arc;

use anyhow::Context;

use config::ProxyConfig;
use inference::UpstreamClient;
use mcp_client::ClientRegistry;
use proxy::ProxyState;

/// Connect the providers, serve until SIGINT/SIGTERM, then shut providers down.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    config.validate()?;

    let upstream = UpstreamClient::new(&config.openai_api_base_url, config.request_timeout())?;

    let registry = if config.enable_mcp {
        ClientRegistry::load_and_connect(&config.mcp_config_path)
            .await
            .context("failed to load MCP servers")?
    } else {
        tracing::info!("MCP disabled, running as a pure proxy");
        ClientRegistry::new()
    };
    let registry = Arc::new(registry);

    let state = Arc::new(ProxyState {
        registry: Arc::clone(&registry),
        upstream: Arc::new(upstream),
        enable_mcp: config.enable_mcp,
        max_iterations: config.max_iteration,
    });

    let listener = tokio::net::TcpListener::bind(config.socket_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.socket_addr()))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        upstream = %config.openai_api_base_url,
        enable_mcp = config.enable_mcp,
        max_iteration = config.max_iteration,
        servers = ?registry.server_names(),
        tools = registry.tools().len(),
        "listening"
    );

    let served = axum::serve(listener, proxy::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown_registry(registry).await;
    served.context("server error")
}

async fn shutdown_registry(registry: Arc<ClientRegistry>) {
    match Arc::try_unwrap(registry) {
        Ok(mut registry) => {
            tracing::info!(servers = registry.len(), "shutting down MCP servers");
            registry.disconnect_all().await;
        }
        Err(_) => {
            tracing::warn!("registry still in use at shutdown, servers will be killed on exit");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
