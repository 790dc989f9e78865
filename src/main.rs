use clap::Parser;

use mcp_proxy::config::ProxyConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = ProxyConfig::parse();
    mcp_proxy::logging::init_tracing(config.log_format, config.log_file.as_deref())?;

    if let Err(e) = mcp_proxy::run(config).await {
        tracing::error!(error = %format!("{e:#}"), "mcp-proxy exited with an error");
        return Err(e);
    }
    Ok(())
}
