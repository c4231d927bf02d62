pub mod feed;
pub mod mock;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::chat::ChatMessage;
use crate::config::{Config, SourceConfig};

pub use self::feed::FeedSource;
pub use self::mock::MockSource;
pub use self::youtube::YoutubeChatSource;

/// Browsers get the full live page; bare clients get a consent wall.
pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Something that can be asked for the latest batch of chat messages
#[async_trait]
pub trait MessageSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch one batch. Errors are transport failures.
    async fn try_fetch(&self) -> Result<Vec<ChatMessage>>;

    /// Fetch one batch, degrading any failure to an empty batch.
    /// The next poll tick simply tries again.
    async fn fetch_messages(&self) -> Vec<ChatMessage> {
        match self.try_fetch().await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Fetch from {} failed: {:#}", self.name(), e);
                Vec::new()
            }
        }
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Build the source selected in `[source]`
pub fn from_config(config: &Config) -> Result<Arc<dyn MessageSource>> {
    let source: Arc<dyn MessageSource> = match &config.source {
        SourceConfig::Youtube => Arc::new(YoutubeChatSource::new(&config.live_page_url())?),
        SourceConfig::Feed { url } => Arc::new(FeedSource::new(url)?),
        SourceConfig::Mock { messages_path } => Arc::new(MockSource::from_file(messages_path)?),
    };
    Ok(source)
}
