mod config;
mod consul;
mod diff;
mod slack;
mod watcher;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use crate::config::Config;
use crate::consul::ConsulClient;
use crate::slack::Notifier;
use crate::watcher::Watcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("consul_watchd=info")),
        )
        .init();

    tracing::info!("Starting consul-watchd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/consul-watchd/watchd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);
    tracing::info!(
        "Watching consul at {}:{} every {}s",
        config.consul.address,
        config.consul.port,
        config.watch.poll_interval_secs
    );

    let consul = ConsulClient::new(&config.consul)?;
    let notifier = Notifier::new(&config.slack);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let watcher_cancel = cancel.clone();
    let watcher_handle = tokio::spawn(async move {
        let mut watcher = Watcher::new(consul, notifier, config);
        if let Err(e) = watcher.run(watcher_cancel).await {
            tracing::error!("Watcher error: {:#}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();
    let _ = watcher_handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
