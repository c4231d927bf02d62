use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::poller::PollerStats;
use crate::scheduler::Scheduler;
use crate::status::StatusMonitor;
use crate::store::EntryStore;

const HEARTBEAT_CRON: &str = "0 0 * * * *";

/// Register built-in background jobs. The stream-status job is only added
/// when `status_cron` is set.
pub async fn register_builtin_tasks(
    scheduler: &Scheduler,
    store: Arc<dyn EntryStore>,
    stats: Arc<RwLock<PollerStats>>,
    status: Arc<StatusMonitor>,
    status_cron: Option<&str>,
) -> anyhow::Result<()> {
    // Heartbeat: log ledger size and poller progress every hour
    scheduler
        .add_cron_job(HEARTBEAT_CRON, "heartbeat", move || {
            let store = Arc::clone(&store);
            let stats = Arc::clone(&stats);
            async move {
                let stats = stats.read().await.clone();
                match store.load().await {
                    Ok(entries) => info!(
                        "Heartbeat: {} entries, {} cycles, {} gifts admitted, {} pending",
                        entries.len(),
                        stats.cycles,
                        stats.events_admitted,
                        stats.pending_events
                    ),
                    Err(e) => warn!("Heartbeat: entry store unavailable: {:#}", e),
                }
            }
            .boxed()
        })
        .await?;

    // Stream status: refresh the cached live/upcoming/offline state
    if let Some(cron) = status_cron {
        scheduler
            .add_cron_job(cron, "stream-status", move || {
                let status = Arc::clone(&status);
                async move { status.refresh().await }.boxed()
            })
            .await?;
    }

    Ok(())
}
