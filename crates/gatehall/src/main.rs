//! Gatehall server binary: configure from the environment, run until
//! interrupted, shut the session registry down cleanly.

use gatehall::{GatehallError, GatehallServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), GatehallError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = config.port, "starting gatehall server");

    let server = GatehallServer::builder().config(config).build().await?;
    let registry = server.registry();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            registry.shutdown().await;
        }
    }

    tracing::info!("gatehall server stopped");
    Ok(())
}
