//! YouTube live chat over the innertube JSON API.
//!
//! The channel's `/live` page carries the API key, client version and the
//! first chat continuation token. Each fetch posts the current continuation
//! to `get_live_chat` and receives the new chat actions plus the next token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{http_client, MessageSource};
use crate::chat::ChatMessage;

const LIVE_CHAT_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/live_chat/get_live_chat";

/// Tokens needed to keep polling one live chat
#[derive(Debug, Clone, PartialEq)]
struct ChatSession {
    api_key: String,
    client_version: String,
    continuation: String,
}

struct PagePatterns {
    api_key: Regex,
    client_version: Regex,
    continuation: Regex,
}

impl PagePatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            api_key: Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#)?,
            client_version: Regex::new(r#""clientVersion"\s*:\s*"([\d.]+)""#)?,
            continuation: Regex::new(r#""continuation"\s*:\s*"([^"]+)""#)?,
        })
    }

    fn parse_live_page(&self, html: &str) -> Result<ChatSession> {
        let capture = |re: &Regex| re.captures(html).map(|c| c[1].to_string());

        let api_key = capture(&self.api_key).context("No innertube API key on live page")?;
        let client_version =
            capture(&self.client_version).context("No client version on live page")?;
        let continuation = capture(&self.continuation)
            .context("No live chat on channel page (stream offline?)")?;

        Ok(ChatSession {
            api_key,
            client_version,
            continuation,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveChatRequest<'a> {
    context: RequestContext<'a>,
    continuation: &'a str,
}

#[derive(Serialize)]
struct RequestContext<'a> {
    client: ClientInfo<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfo<'a> {
    client_name: &'a str,
    client_version: &'a str,
}

pub struct YoutubeChatSource {
    client: reqwest::Client,
    live_page_url: String,
    patterns: PagePatterns,
    session: Mutex<Option<ChatSession>>,
}

impl YoutubeChatSource {
    pub fn new(live_page_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            live_page_url: live_page_url.to_string(),
            patterns: PagePatterns::new()?,
            session: Mutex::new(None),
        })
    }

    async fn resolve_session(&self) -> Result<ChatSession> {
        let html = self
            .client
            .get(&self.live_page_url)
            .send()
            .await
            .context("Failed to load live page")?
            .error_for_status()
            .context("Live page returned an error")?
            .text()
            .await
            .context("Failed to read live page")?;

        let session = self.patterns.parse_live_page(&html)?;
        info!("Live chat found for {}", self.live_page_url);
        Ok(session)
    }

    async fn poll_chat(&self, session: &ChatSession) -> Result<Value> {
        let url = format!("{}?key={}", LIVE_CHAT_ENDPOINT, session.api_key);
        let request = LiveChatRequest {
            context: RequestContext {
                client: ClientInfo {
                    client_name: "WEB",
                    client_version: &session.client_version,
                },
            },
            continuation: &session.continuation,
        };

        let body = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to reach live chat endpoint")?
            .error_for_status()
            .context("Live chat endpoint returned an error")?
            .json()
            .await
            .context("Failed to parse live chat response")?;
        Ok(body)
    }
}

#[async_trait]
impl MessageSource for YoutubeChatSource {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn try_fetch(&self) -> Result<Vec<ChatMessage>> {
        // Held for the whole fetch; the poller never fetches concurrently anyway.
        let mut guard = self.session.lock().await;

        let session = match guard.take() {
            Some(session) => session,
            None => self.resolve_session().await?,
        };

        // On error the session stays None and the next tick re-resolves the page.
        let body = self.poll_chat(&session).await?;
        let (messages, next) = parse_chat_response(&body);

        match next {
            Some(continuation) => {
                *guard = Some(ChatSession {
                    continuation,
                    ..session
                });
            }
            None => info!("Live chat ended, will look for a new stream"),
        }

        debug!("YouTube chat returned {} messages", messages.len());
        Ok(messages)
    }
}

/// Pull chat messages and the next continuation token out of a `get_live_chat` response
fn parse_chat_response(body: &Value) -> (Vec<ChatMessage>, Option<String>) {
    let chat = &body["continuationContents"]["liveChatContinuation"];

    let messages: Vec<ChatMessage> = chat["actions"]
        .as_array()
        .map(|actions| {
            actions
                .iter()
                .filter_map(|action| parse_item(&action["addChatItemAction"]["item"]))
                .collect()
        })
        .unwrap_or_default();

    let next = chat["continuations"]
        .as_array()
        .and_then(|c| c.first())
        .and_then(|c| {
            [
                "invalidationContinuationData",
                "timedContinuationData",
                "reloadContinuationData",
            ]
            .iter()
            .find_map(|kind| c[*kind]["continuation"].as_str())
        })
        .map(str::to_string);

    (messages, next)
}

fn parse_item(item: &Value) -> Option<ChatMessage> {
    if let Some(r) = item
        .get("liveChatTextMessageRenderer")
        .or_else(|| item.get("liveChatPaidMessageRenderer"))
    {
        return Some(ChatMessage::new(
            r["id"].as_str()?,
            text_of(&r["authorName"]),
            text_of(&r["message"]),
        ));
    }

    if let Some(r) = item.get("liveChatSponsorshipsGiftPurchaseAnnouncementRenderer") {
        let header = &r["header"]["liveChatSponsorshipsHeaderRenderer"];
        let count = first_number(&text_of(&header["primaryText"]))?;
        return Some(ChatMessage::new(
            r["id"].as_str()?,
            text_of(&header["authorName"]),
            format!("gifted {} memberships", count),
        ));
    }

    None
}

/// Text from either `{simpleText}` or `{runs: [{text}, {emoji}, ..]}`
fn text_of(value: &Value) -> String {
    if let Some(s) = value["simpleText"].as_str() {
        return s.to_string();
    }
    value["runs"]
        .as_array()
        .map(|runs| runs.iter().filter_map(|r| r["text"].as_str()).collect())
        .unwrap_or_default()
}

fn first_number(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_live_page_tokens() {
        let html = r#"<script>ytcfg.set({"INNERTUBE_API_KEY":"AIzaKEY","clientVersion":"2.20240101.00.00"});
            var ytInitialData = {"liveChatRenderer":{"continuations":[{"reloadContinuationData":{"continuation":"0ofMyANCONT"}}]}};</script>"#;
        let session = PagePatterns::new().unwrap().parse_live_page(html).unwrap();
        assert_eq!(
            session,
            ChatSession {
                api_key: "AIzaKEY".into(),
                client_version: "2.20240101.00.00".into(),
                continuation: "0ofMyANCONT".into(),
            }
        );
    }

    #[test]
    fn test_offline_page_has_no_session() {
        let html = r#"{"INNERTUBE_API_KEY":"AIzaKEY","clientVersion":"2.1"}"#;
        let err = PagePatterns::new()
            .unwrap()
            .parse_live_page(html)
            .unwrap_err();
        assert!(err.to_string().contains("No live chat"));
    }

    #[test]
    fn test_parse_chat_response() {
        let body = json!({
            "continuationContents": {
                "liveChatContinuation": {
                    "continuations": [
                        { "timedContinuationData": { "continuation": "NEXT", "timeoutMs": 5000 } }
                    ],
                    "actions": [
                        { "addChatItemAction": { "item": { "liveChatTextMessageRenderer": {
                            "id": "msg-1",
                            "authorName": { "simpleText": "Bob" },
                            "message": { "runs": [
                                { "text": "just gifted 2 " },
                                { "emoji": { "emojiId": "x" } },
                                { "text": "memberships" }
                            ] }
                        } } } },
                        { "addChatItemAction": { "item": {
                            "liveChatSponsorshipsGiftPurchaseAnnouncementRenderer": {
                                "id": "gift-1",
                                "header": { "liveChatSponsorshipsHeaderRenderer": {
                                    "authorName": { "simpleText": "Amy" },
                                    "primaryText": { "runs": [
                                        { "text": "Sent " }, { "text": "1,000" },
                                        { "text": " Reaper gift memberships" }
                                    ] }
                                } }
                            }
                        } } },
                        { "addChatItemAction": { "item": { "liveChatViewerEngagementMessageRenderer": {} } } },
                        { "markChatItemAsDeletedAction": {} }
                    ]
                }
            }
        });

        let (messages, next) = parse_chat_response(&body);
        assert_eq!(next.as_deref(), Some("NEXT"));
        assert_eq!(
            messages,
            vec![
                ChatMessage::new("msg-1", "Bob", "just gifted 2 memberships"),
                ChatMessage::new("gift-1", "Amy", "gifted 1000 memberships"),
            ]
        );
    }

    #[test]
    fn test_response_without_continuation_ends_session() {
        let (messages, next) = parse_chat_response(&json!({}));
        assert!(messages.is_empty());
        assert!(next.is_none());
    }
}
