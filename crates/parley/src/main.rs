//! The `parley` daemon.
//!
//! Configuration comes from `PARLEY_CONFIG` (a JSON file) and
//! `PARLEY_BIND`; log filtering from `RUST_LOG`. Ctrl-C stops accepting
//! new connections.

use parley::{ParleyError, ParleyServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ParleyError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(?config, "loaded configuration");

    let server = ParleyServer::builder().config(config).build().await?;
    tracing::info!(addr = %server.local_addr()?, "parley listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("received ctrl-c");
        })
        .await
}
