use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{http_client, MessageSource};
use crate::chat::ChatMessage;

/// Polls an external scraper that serves its latest chat messages as JSON
pub struct FeedSource {
    client: reqwest::Client,
    url: String,
}

/// Feeds either return a bare array or wrap it in `{ "messages": [..] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedBody {
    Wrapped { messages: Vec<ChatMessage> },
    Bare(Vec<ChatMessage>),
}

impl FeedSource {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self::with_client(url, http_client()?))
    }

    pub fn with_client(url: &str, client: reqwest::Client) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl MessageSource for FeedSource {
    fn name(&self) -> &str {
        "feed"
    }

    async fn try_fetch(&self) -> Result<Vec<ChatMessage>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to reach feed {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Feed {} returned {}", self.url, status);
        }

        let body: FeedBody = response
            .json()
            .await
            .context("Failed to parse feed response")?;
        let messages = match body {
            FeedBody::Wrapped { messages } => messages,
            FeedBody::Bare(messages) => messages,
        };

        debug!("Feed returned {} messages", messages.len());
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn local_source(url: String) -> FeedSource {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        FeedSource::with_client(&url, client)
    }

    #[tokio::test]
    async fn test_reads_bare_and_wrapped_feeds() {
        let router = Router::new()
            .route(
                "/bare",
                get(|| async {
                    Json(serde_json::json!([
                        { "id": "m1", "author": "Bob", "text": "gifted 2 memberships" }
                    ]))
                }),
            )
            .route(
                "/wrapped",
                get(|| async {
                    Json(serde_json::json!({
                        "messages": [{ "id": "m2", "author_name": "Amy", "raw_text": "hi" }]
                    }))
                }),
            );
        let base = serve(router).await;

        let bare = local_source(format!("{base}/bare"));
        let batch = bare.try_fetch().await.unwrap();
        assert_eq!(batch, vec![ChatMessage::new("m1", "Bob", "gifted 2 memberships")]);

        let wrapped = local_source(format!("{base}/wrapped"));
        let batch = wrapped.try_fetch().await.unwrap();
        assert_eq!(batch[0].author_name, "Amy");
    }

    #[tokio::test]
    async fn test_error_status_degrades_to_empty() {
        let router = Router::new().route(
            "/down",
            get(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
        );
        let base = serve(router).await;

        let source = local_source(format!("{base}/down"));
        assert!(source.try_fetch().await.is_err());
        assert!(source.fetch_messages().await.is_empty());
    }
}
