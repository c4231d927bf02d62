use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::chat::GiftEvent;
use crate::config::PollerConfig;
use crate::dedup::ProcessedIds;
use crate::extract::GiftExtractor;
use crate::source::MessageSource;
use crate::store::EntryStore;

/// Running totals shared with the HTTP layer
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollerStats {
    pub cycles: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub messages_seen: u64,
    pub events_admitted: u64,
    pub entries_appended: u64,
    pub pending_events: usize,
    pub processed_ids: usize,
    pub last_error: Option<String>,
}

/// What one poll cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub messages: usize,
    pub admitted: usize,
    pub duplicates: usize,
    pub entries_appended: u64,
}

/// Drives fetch -> extract -> dedup -> append on a fixed interval.
///
/// The poller is the only writer of the processed-ID set and the only code
/// path that appends entries. Events that could not be persisted stay in a
/// bounded retry queue and are flushed, in order, on later cycles.
pub struct Poller {
    source: Arc<dyn MessageSource>,
    store: Arc<dyn EntryStore>,
    extractor: GiftExtractor,
    processed: ProcessedIds,
    processed_dirty: bool,
    pending: VecDeque<GiftEvent>,
    retry_queue_cap: usize,
    interval: Duration,
    stats: Arc<RwLock<PollerStats>>,
}

impl Poller {
    /// Build a poller, restoring processed IDs from the store
    pub async fn new(
        source: Arc<dyn MessageSource>,
        store: Arc<dyn EntryStore>,
        config: &PollerConfig,
    ) -> Result<Self> {
        let persisted = store
            .load_processed_ids()
            .await
            .context("Failed to load processed message IDs")?;
        let processed = ProcessedIds::with_ids(config.processed_id_cap, persisted);
        info!(
            "Restored {} processed message IDs (cap {})",
            processed.len(),
            processed.cap()
        );

        Ok(Self {
            source,
            store,
            extractor: GiftExtractor::with_max_count(config.max_gift_count),
            processed,
            processed_dirty: false,
            pending: VecDeque::new(),
            retry_queue_cap: config.retry_queue_cap,
            interval: Duration::from_secs(config.interval_secs),
            stats: Arc::new(RwLock::new(PollerStats::default())),
        })
    }

    pub fn stats(&self) -> Arc<RwLock<PollerStats>> {
        Arc::clone(&self.stats)
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Run one fetch-extract-dedup-append cycle.
    /// Returns an error when queued events could not be persisted; they stay queued.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let messages = self.source.fetch_messages().await;
        let mut report = CycleReport {
            messages: messages.len(),
            ..Default::default()
        };

        for message in &messages {
            let Some(event) = self.extractor.extract(message) else {
                continue;
            };
            if !self.processed.admit(&event.message_id) {
                debug!("Skipping already processed gift {}", event.message_id);
                report.duplicates += 1;
                continue;
            }
            self.processed_dirty = true;
            report.admitted += 1;
            self.enqueue(event);
        }

        let flushed = self.flush_pending(&mut report).await;
        self.save_processed_ids().await;
        flushed?;

        Ok(report)
    }

    fn enqueue(&mut self, event: GiftEvent) {
        if self.pending.len() >= self.retry_queue_cap {
            if let Some(dropped) = self.pending.pop_front() {
                error!(
                    "Retry queue full, dropping {} entries for {} (message {})",
                    dropped.gifted_count, dropped.author, dropped.message_id
                );
            }
        }
        self.pending.push_back(event);
    }

    /// Append queued events in order, stopping at the first store failure
    async fn flush_pending(&mut self, report: &mut CycleReport) -> Result<()> {
        while let Some(event) = self.pending.front() {
            self.store
                .append(&event.author, event.gifted_count)
                .await
                .with_context(|| {
                    format!(
                        "Failed to persist {} entries for {} ({} events queued)",
                        event.gifted_count,
                        event.author,
                        self.pending.len()
                    )
                })?;

            info!("Added {} entries for: {}", event.gifted_count, event.author);
            report.entries_appended += u64::from(event.gifted_count);
            self.pending.pop_front();
        }
        Ok(())
    }

    async fn save_processed_ids(&mut self) {
        if !self.processed_dirty {
            return;
        }
        match self
            .store
            .save_processed_ids(&self.processed.snapshot())
            .await
        {
            Ok(()) => self.processed_dirty = false,
            Err(e) => error!("Failed to save processed message IDs: {:#}", e),
        }
    }

    /// One timer tick: run a cycle, never letting an error or panic escape
    async fn tick(&mut self) {
        let outcome = AssertUnwindSafe(self.run_cycle()).catch_unwind().await;

        let (report, last_error) = match outcome {
            Ok(Ok(report)) => (report, None),
            Ok(Err(e)) => {
                error!("Poll cycle failed: {:#}", e);
                (CycleReport::default(), Some(format!("{:#}", e)))
            }
            Err(_) => {
                error!("Poll cycle panicked");
                (CycleReport::default(), Some("poll cycle panicked".to_string()))
            }
        };

        if report.admitted > 0 {
            info!(
                "Cycle: {} messages, {} new gifts, {} entries appended",
                report.messages, report.admitted, report.entries_appended
            );
        }

        let mut stats = self.stats.write().await;
        stats.cycles += 1;
        stats.last_cycle_at = Some(Utc::now());
        stats.messages_seen += report.messages as u64;
        stats.events_admitted += report.admitted as u64;
        stats.entries_appended += report.entries_appended;
        stats.pending_events = self.pending.len();
        stats.processed_ids = self.processed.len();
        stats.last_error = last_error;
    }

    /// Poll until `shutdown` flips to true (or its sender is dropped).
    /// The signal is only observed between cycles, so a running cycle always completes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // A slow cycle swallows the ticks it overlapped instead of queueing them.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Poller started: source {}, store {}, every {:?}",
            self.source.name(),
            self.store.backend(),
            self.interval
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.finish().await;
    }

    /// Last attempt to persist anything still queued
    async fn finish(&mut self) {
        if !self.pending.is_empty() {
            let mut report = CycleReport::default();
            if let Err(e) = self.flush_pending(&mut report).await {
                warn!(
                    "Stopping with {} unpersisted gift events: {:#}",
                    self.pending.len(),
                    e
                );
            }
        }
        self.save_processed_ids().await;
        info!("Poller stopped");
    }
}
