//! Ferry Proxy Server - Entry Point
//!
//! Starts the proxy server and the access-log writer with graceful
//! shutdown support.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod error;
mod proxy;
mod services;

use cache::WireCache;
use config::Config;
use proxy::server::ProxyServer;
use services::access_log;

/// Caching forward HTTP proxy
#[derive(Parser)]
#[command(name = "ferry", version, about)]
struct Cli {
    /// Port to listen on for client connections
    port: u16,
}

#[tokio::main]
async fn main() -> error::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing port argument prints usage to stderr and exits non-zero.
    let cli = Cli::parse();

    let config = Config::load(cli.port)?;
    info!("Configuration loaded");

    let cache = Arc::new(WireCache::new(&config.cache));

    // Access-log writer runs beside the proxy, fed over a channel.
    let (log_handle, log_writer) = access_log::channel(config.access_log.path.clone());

    // Bind before spawning anything: a listener setup failure is fatal.
    let server = ProxyServer::bind(&config, Arc::clone(&cache), log_handle).await?;

    // Create shutdown channel
    let (shutdown_tx, _) = watch::channel(false);

    let log_shutdown = shutdown_tx.subscribe();
    let log_task = tokio::spawn(log_writer.run(log_shutdown));

    let proxy_shutdown = shutdown_tx.subscribe();
    let proxy_task = tokio::spawn(async move {
        if let Err(e) = server.run(proxy_shutdown).await {
            error!("Proxy server error: {}", e);
        }
    });

    info!(
        "Ferry started - listening on {}, access log at {}",
        config.listen_addr(),
        config.access_log.path
    );

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(proxy_task, log_task);

    let stats = cache.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        rejected = stats.rejected,
        cached_bytes = stats.total_bytes,
        "Ferry stopped"
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
