//! Resmon Daemon
//!
//! Samples CPU, GPU and memory sensors on a fixed interval and fans every
//! snapshot out to in-process observers, WebSocket subscribers and the log.

mod collector;
mod config;
mod sensors;
mod sinks;
mod state;
mod web;

use anyhow::{Context, Result};
use resmon_hw::LinuxSource;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use collector::Collector;
use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = Config::load_or_default(&config_path).context("Failed to load configuration")?;
    info!("Loaded configuration from: {}", config_path);

    // Initialize application state
    let state = Arc::new(AppState::new(config.clone()));

    // Open sensors and start the collector
    let source = LinuxSource::open().context("Failed to open sensor source")?;
    let collector = Collector::new(source, state.build_sinks(), config.interval());
    let collector_task = tokio::spawn(collector.run(state.shutdown.clone()));

    // Signals only cancel the token; the server and collector drain from it
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    let signal_shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
            }
            _ = signal_shutdown.cancelled() => {}
        }
        signal_shutdown.cancel();
    });

    // Optionally start web server
    let served = if config.web.enable {
        let addr: SocketAddr = config
            .web
            .listen
            .parse()
            .context("Invalid listen address")?;
        let listener = TcpListener::bind(addr).await?;
        info!("Web server listening on http://{}", addr);
        web::serve(listener, state.clone()).await
    } else {
        info!("Web server disabled");
        state.shutdown.cancelled().await;
        Ok(())
    };

    // A server error still stops the collector before reporting
    state.shutdown.cancel();
    match collector_task.await {
        Ok(stats) => info!("Collected {} snapshots", stats.ticks - stats.skipped),
        Err(e) => warn!("Collector task failed: {}", e),
    }
    served.context("Web server failed")?;

    Ok(())
}
