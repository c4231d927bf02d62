use regex::Regex;
use tracing::trace;

use crate::chat::{ChatMessage, GiftEvent};

/// Matches "gift 3 memberships", "Gifted 1 membership", ... anywhere in the text.
const GIFT_PATTERN: &str = r"(?i)\bgift(?:ed)?\s+(\d+)\s+memberships?";

/// Largest gift pack YouTube sells. Bigger counts in chat text are jokes.
pub const DEFAULT_MAX_GIFT_COUNT: u32 = 50;

/// Pattern matcher that turns chat text into gift events
#[derive(Debug, Clone)]
pub struct GiftExtractor {
    pattern: Regex,
    max_count: u32,
}

impl GiftExtractor {
    pub fn new() -> Self {
        Self::with_max_count(DEFAULT_MAX_GIFT_COUNT)
    }

    /// Extractor that rejects counts above `max_count`
    pub fn with_max_count(max_count: u32) -> Self {
        // The pattern is a compile-time constant; failure here is a programming error.
        let pattern = Regex::new(GIFT_PATTERN).expect("gift pattern must compile");
        Self { pattern, max_count }
    }

    /// Extract a gift event from a chat message.
    /// Only the first gift phrase in a message counts. Zero, unparseable or
    /// over-the-limit counts yield None.
    pub fn extract(&self, message: &ChatMessage) -> Option<GiftEvent> {
        let captures = self.pattern.captures(&message.raw_text)?;
        let gifted_count = match captures[1].parse::<u32>() {
            Ok(n) if n > 0 && n <= self.max_count => n,
            _ => {
                trace!("Ignoring gift phrase with bad count in {}", message.id);
                return None;
            }
        };

        Some(GiftEvent {
            message_id: message.id.clone(),
            author: message.author_name.clone(),
            gifted_count,
        })
    }
}

impl Default for GiftExtractor {
    fn default() -> Self {
        Self::new()
    }
}
