use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::MessageSource;
use crate::chat::ChatMessage;

/// Replays scripted batches, one per fetch. Returns empty batches once exhausted.
pub struct MockSource {
    batches: Mutex<VecDeque<Vec<ChatMessage>>>,
}

impl MockSource {
    pub fn new(batches: Vec<Vec<ChatMessage>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
        }
    }

    /// Load batches from a JSON file: `[[{"id": .., "author": .., "text": ..}, ..], ..]`.
    /// Messages without an `id` get a random one.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mock messages: {}", path.display()))?;
        let raw: Vec<Vec<ScriptedMessage>> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse mock messages: {}", path.display()))?;

        let batches: Vec<Vec<ChatMessage>> = raw
            .into_iter()
            .map(|batch| batch.into_iter().map(ScriptedMessage::into_message).collect())
            .collect();

        info!(
            "Loaded {} mock batches from {}",
            batches.len(),
            path.display()
        );
        Ok(Self::new(batches))
    }

    #[cfg(test)]
    pub async fn remaining(&self) -> usize {
        self.batches.lock().await.len()
    }
}

#[derive(serde::Deserialize)]
struct ScriptedMessage {
    #[serde(default)]
    id: Option<String>,
    author: String,
    text: String,
}

impl ScriptedMessage {
    fn into_message(self) -> ChatMessage {
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        ChatMessage::new(id, self.author, self.text)
    }
}

#[async_trait]
impl MessageSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn try_fetch(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.batches.lock().await.pop_front().unwrap_or_default())
    }
}
