use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::source::http_client;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Live,
    Upcoming,
    Offline,
}

/// Classify a channel `/live` page by the markers YouTube embeds in it
pub fn classify_live_page(html: &str) -> StreamStatus {
    if html.contains(r#""isLive":true"#) || html.contains(r#""liveBroadcastContent":"live""#) {
        StreamStatus::Live
    } else if html.contains(r#""upcomingEventData""#) {
        StreamStatus::Upcoming
    } else {
        StreamStatus::Offline
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    status: StreamStatus,
    checked_at: DateTime<Utc>,
}

/// Cached stream status. Probes run in the background; readers only see the cache.
pub struct StatusMonitor {
    client: Option<reqwest::Client>,
    live_page_url: String,
    timeout: Duration,
    last: RwLock<Option<Observation>>,
}

impl StatusMonitor {
    pub fn new(live_page_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(live_page_url, timeout, http_client()?))
    }

    pub fn with_client(live_page_url: &str, timeout: Duration, client: reqwest::Client) -> Self {
        Self {
            client: Some(client),
            live_page_url: live_page_url.to_string(),
            timeout,
            last: RwLock::new(None),
        }
    }

    /// A monitor that never probes and always reports offline
    pub fn disabled() -> Self {
        Self {
            client: None,
            live_page_url: String::new(),
            timeout: Duration::ZERO,
            last: RwLock::new(None),
        }
    }

    /// Last observed status, offline if nothing has been observed yet
    pub async fn current(&self) -> StreamStatus {
        self.last
            .read()
            .await
            .map(|o| o.status)
            .unwrap_or(StreamStatus::Offline)
    }

    pub async fn checked_at(&self) -> Option<DateTime<Utc>> {
        self.last.read().await.map(|o| o.checked_at)
    }

    pub async fn record(&self, status: StreamStatus) {
        *self.last.write().await = Some(Observation {
            status,
            checked_at: Utc::now(),
        });
    }

    /// Probe the live page and update the cache. Failures are logged and leave the cache as-is.
    pub async fn refresh(&self) {
        let Some(client) = &self.client else {
            return;
        };

        match tokio::time::timeout(self.timeout, self.probe(client)).await {
            Ok(Ok(status)) => {
                debug!("Stream status: {:?}", status);
                self.record(status).await;
            }
            Ok(Err(e)) => warn!("Stream status probe failed: {:#}", e),
            Err(_) => warn!("Stream status probe timed out after {:?}", self.timeout),
        }
    }

    async fn probe(&self, client: &reqwest::Client) -> Result<StreamStatus> {
        let html = client
            .get(&self.live_page_url)
            .send()
            .await
            .context("Failed to load live page")?
            .error_for_status()
            .context("Live page returned an error")?
            .text()
            .await
            .context("Failed to read live page")?;
        Ok(classify_live_page(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_live_page() {
        assert_eq!(
            classify_live_page(r#"{"videoDetails":{"isLive":true}}"#),
            StreamStatus::Live
        );
        assert_eq!(
            classify_live_page(r#"{"liveBroadcastContent":"live"}"#),
            StreamStatus::Live
        );
        assert_eq!(
            classify_live_page(r#"{"upcomingEventData":{"startTime":"1700000000"}}"#),
            StreamStatus::Upcoming
        );
        assert_eq!(
            classify_live_page("<html>channel home</html>"),
            StreamStatus::Offline
        );
    }

    #[tokio::test]
    async fn test_disabled_monitor_reports_offline() {
        let monitor = StatusMonitor::disabled();
        monitor.refresh().await;
        assert_eq!(monitor.current().await, StreamStatus::Offline);
        assert!(monitor.checked_at().await.is_none());
    }

    #[tokio::test]
    async fn test_record_updates_cache() {
        let monitor = StatusMonitor::disabled();
        monitor.record(StreamStatus::Upcoming).await;
        assert_eq!(monitor.current().await, StreamStatus::Upcoming);
        assert!(monitor.checked_at().await.is_some());
    }

    async fn monitor_for(router: axum::Router) -> StatusMonitor {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        StatusMonitor::with_client(
            &format!("http://{addr}/live"),
            Duration::from_secs(5),
            client,
        )
    }

    #[tokio::test]
    async fn test_refresh_records_live_page() {
        let router = axum::Router::new().route(
            "/live",
            axum::routing::get(|| async { r#"{"videoDetails":{"isLive":true}}"# }),
        );
        let monitor = monitor_for(router).await;
        monitor.refresh().await;
        assert_eq!(monitor.current().await, StreamStatus::Live);
        assert!(monitor.checked_at().await.is_some());
    }

    #[tokio::test]
    async fn test_error_page_is_not_an_observation() {
        let router = axum::Router::new().route(
            "/live",
            axum::routing::get(|| async {
                (
                    axum::http::StatusCode::TOO_MANY_REQUESTS,
                    "<html>unusual traffic</html>",
                )
            }),
        );
        let monitor = monitor_for(router).await;
        monitor.record(StreamStatus::Live).await;
        let before = monitor.checked_at().await;

        monitor.refresh().await;
        assert_eq!(monitor.current().await, StreamStatus::Live);
        assert_eq!(monitor.checked_at().await, before);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&StreamStatus::Live).unwrap(),
            "\"live\""
        );
    }
}
