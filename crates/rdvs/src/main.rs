#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use rdvs::config::{Args, ServerConfig};
use rdvs::{run, ServerState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config: ServerConfig = args.into();

    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {e}");
    }

    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);

    let state = Arc::new(ServerState::new(config));

    tokio::select! {
        result = run(listener, state) => {
            if let Err(e) = result {
                tracing::error!("server error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}
