//! # meshcall-server
//!
//! Backend for meshcall clients.
//!
//! This binary provides:
//! - **REST API** (axum) for creating, joining, leaving and listing group
//!   calls, backed by the SQLite store
//! - **libp2p relay node**: circuit relay v2 for peers behind NAT and a
//!   GossipSub member of the signaling topic

mod api;
mod config;
mod error;
mod relay;

use tracing::info;
use tracing_subscriber::EnvFilter;

use meshcall_store::{Database, SqliteDirectory};

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,meshcall_server=debug")),
        )
        .init();

    info!("Starting meshcall server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let database = Database::open_at(&config.database_path)?;
    let directory = SqliteDirectory::new(database);

    let (relay_peer_id, relay_stats) =
        relay::spawn_relay(&config.listen_addr, &config.signaling_topic).await?;
    info!(
        peer_id = %relay_peer_id,
        addr = %config.listen_addr,
        "Relay node running in background"
    );

    let app_state = AppState {
        directory,
        relay_stats,
    };

    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
