use serde::{Deserialize, Serialize};

/// A chat message as delivered by a message source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Source-specific message ID, unique per chat message
    pub id: String,
    /// Display name of the sender
    #[serde(alias = "author")]
    pub author_name: String,
    /// The message text
    #[serde(alias = "text", alias = "message")]
    pub raw_text: String,
}

impl ChatMessage {
    pub fn new(
        id: impl Into<String>,
        author_name: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author_name: author_name.into(),
            raw_text: raw_text.into(),
        }
    }
}

/// A detected "gifted N memberships" message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GiftEvent {
    pub message_id: String,
    pub author: String,
    pub gifted_count: u32,
}
