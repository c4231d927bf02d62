mod chat;
mod config;
mod dedup;
mod error;
mod extract;
mod poller;
mod scheduler;
mod server;
mod source;
mod status;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::poller::Poller;
use crate::scheduler::Scheduler;
use crate::server::{AppState, ClearToken};
use crate::status::StatusMonitor;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,giftwheel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Channel: {}", config.channel.id);
    info!("  Source: {}", config.source);
    info!("  Storage: {}", config.storage);
    info!("  Poll interval: {}s", config.poller.interval_secs);

    let store = store::open(&config.storage).await?;
    let source = source::from_config(&config)?;
    let poller = Poller::new(source, Arc::clone(&store), &config.poller).await?;
    let stats = poller.stats();

    let status = if config.status_probing() {
        Arc::new(StatusMonitor::new(
            &config.live_page_url(),
            Duration::from_secs(config.status.probe_timeout_secs),
        )?)
    } else {
        Arc::new(StatusMonitor::disabled())
    };
    {
        let status = Arc::clone(&status);
        tokio::spawn(async move { status.refresh().await });
    }

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_builtin_tasks(
        &scheduler,
        Arc::clone(&store),
        Arc::clone(&stats),
        Arc::clone(&status),
        config
            .status_probing()
            .then_some(config.status.refresh_cron.as_str()),
    )
    .await?;
    scheduler.start().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_handle = tokio::spawn(poller.run(shutdown_rx.clone()));

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested, finishing current poll cycle...");
        let _ = signal_tx.send(true);
    });

    let state = AppState {
        store,
        clear_token: ClearToken::new(&config.server.clear_token),
        status,
        stats,
    };
    let served = server::serve(state, &config.server.bind, shutdown_rx).await;
    if let Err(e) = &served {
        error!("{:#}", e);
    }

    // Whatever stopped the server also stops the poller
    let _ = shutdown_tx.send(true);
    if let Err(e) = poller_handle.await {
        error!("Poller task failed: {}", e);
    }
    scheduler.shutdown().await?;

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
