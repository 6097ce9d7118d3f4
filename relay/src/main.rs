//! objdist relay
//!
//! Hosts a distributor and exposes it over HTTP and WebSocket:
//! 1. `GET/PUT/DELETE /api/v1/tree[/keypath]` to read and edit the tree
//! 2. `/ws/<channel>` to subscribe to a subtree and push edits back
//!
//! Usage:
//!   objdist-relay --port 4002 --prefix root
//!
//! The tree lives in memory only and is lost on restart.

use anyhow::{Context, Result};
use clap::Parser;
use objdist_relay::{RelayState, WsTransport, build_router};
use objdist_sync::SyncConfig;
use objdist_types::Delimiter;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "objdist-relay")]
#[command(about = "objdist state tree relay")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "4002")]
    port: u16,

    /// Name of the root channel
    #[arg(long, default_value = objdist_sync::DEFAULT_PREFIX)]
    prefix: String,

    /// Keypath delimiter used in channel names and payloads
    #[arg(short, long, default_value = objdist_types::DEFAULT_DELIMITER)]
    delimiter: String,

    /// Per-channel queue depth for slow subscribers
    #[arg(long, default_value_t = objdist_relay::transport::DEFAULT_CAPACITY)]
    capacity: usize,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("objdist relay starting...");
    let delimiter = Delimiter::new(args.delimiter).context("Invalid delimiter")?;
    let config = SyncConfig::new(args.prefix, delimiter);
    let state = Arc::new(
        RelayState::new(WsTransport::new(args.capacity), config.clone())
            .context("Invalid relay configuration")?,
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .with_context(|| format!("Failed to bind port {}", args.port))?;
    info!(
        "Listening on port {} (root channel {})",
        args.port,
        config.root_channel()
    );

    axum::serve(listener, build_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    state.shutdown().await;
    info!("objdist relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
}
