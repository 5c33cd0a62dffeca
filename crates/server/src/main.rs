//! quotesync MCP server entry point.
//!
//! Boots the storage facade from layered configuration and serves it over
//! stdio. Logging goes to stderr to avoid interfering with the JSON-RPC
//! protocol on stdout.

use anyhow::Result;
use quotesync_client::StorageClient;
use quotesync_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        remote = config.remote_url.is_some(),
        "Starting quotesync-mcp server on stdio transport"
    );

    let storage = StorageClient::connect(&config).await?;
    let handler = handler::QuoteSyncServer::new(storage);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
