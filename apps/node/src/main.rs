//! Silo storage node entry point.

mod config;

use silo_node_rpc::NodeServer;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::NodeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting silo node");

    let path = std::env::args().nth(1);
    let config = NodeConfig::load(path.as_deref())?;

    let cancel = CancellationToken::new();
    let server = NodeServer::new(cancel.clone());
    let (local, listener) = server.listen(&config.listen_address).await?;
    tracing::info!(%local, "accepting connections");

    let serving = server.clone();
    let serve = tokio::spawn(async move { serving.serve(listener).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    cancel.cancel();
    serve.await??;

    let stats = server.stats();
    tracing::info!(
        accepted = stats.accepted,
        peak_open = stats.peak_open,
        "node shut down cleanly"
    );
    Ok(())
}
