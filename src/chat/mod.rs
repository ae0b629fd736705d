// src/chat/mod.rs
// Typed wrapper over the chat platform's REST API, with TTL caches for
// users and channels and text normalization shared by ingestion and search.

mod normalize;

pub use normalize::normalize_text;

use crate::config::ChatConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Canvas, Channel, Message, MessageKind, Reaction, User};
use crate::rate_limit::{Provider, RateGovernor};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
}

pub struct ChatClient {
    http: reqwest::Client,
    config: ChatConfig,
    governor: Arc<RateGovernor>,
    users: RwLock<HashMap<String, CacheEntry<User>>>,
    channels: RwLock<HashMap<String, CacheEntry<Channel>>>,
}

impl ChatClient {
    pub fn new(config: ChatConfig, governor: Arc<RateGovernor>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build chat http client"),
            config,
            governor,
            users: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        }
    }

    async fn acquire(&self, endpoint: &str) -> ServiceResult<()> {
        self.governor
            .acquire(Provider::Chat, endpoint)
            .await
            .map_err(ServiceError::Other)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> ServiceResult<T> {
        self.acquire(endpoint).await?;

        let response = self
            .http
            .get(self.url(endpoint))
            .bearer_auth(&self.config.bot_token)
            .query(query)
            .send()
            .await
            .map_err(|e| retry_or_timeout(endpoint, e))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30);
            self.governor.notify_retry_after(
                Provider::Chat,
                endpoint,
                Duration::from_secs(retry_after),
            );
            return Err(ServiceError::UpstreamThrottled {
                provider: "chat".to_string(),
            });
        }

        if !response.status().is_success() {
            return Err(ServiceError::UpstreamInvalid {
                provider: "chat".to_string(),
                detail: format!("status {}", response.status()),
            });
        }

        response.json::<T>().await.map_err(|e| ServiceError::UpstreamInvalid {
            provider: "chat".to_string(),
            detail: e.to_string(),
        })
    }

    /// Fetches one page of a channel's history, newest-last. `cursor` is the
    /// platform's opaque pagination token; `None` requests the first page.
    pub async fn history_page(
        &self,
        channel_id: &str,
        since_ts: Option<&str>,
        cursor: Option<&str>,
    ) -> ServiceResult<HistoryPage> {
        let oldest = since_ts.unwrap_or("0").to_string();
        let mut query: Vec<(&str, &str)> = vec![("channel", channel_id), ("oldest", &oldest)];
        if let Some(c) = cursor {
            query.push(("cursor", c));
        }

        let raw: RawHistoryResponse = self.get_json("conversations.history", &query).await?;
        let messages = raw
            .messages
            .into_iter()
            .map(|m| m.into_message(channel_id, MessageKind::Message))
            .collect();

        Ok(HistoryPage {
            messages,
            next_cursor: raw.response_metadata.and_then(|m| m.next_cursor).filter(|c| !c.is_empty()),
        })
    }

    pub async fn thread_replies_page(
        &self,
        channel_id: &str,
        root_ts: &str,
        cursor: Option<&str>,
    ) -> ServiceResult<HistoryPage> {
        let mut query: Vec<(&str, &str)> = vec![("channel", channel_id), ("ts", root_ts)];
        if let Some(c) = cursor {
            query.push(("cursor", c));
        }

        let raw: RawHistoryResponse = self.get_json("conversations.replies", &query).await?;
        let messages = raw
            .messages
            .into_iter()
            .filter(|m| m.ts != root_ts)
            .map(|m| {
                let mut msg = m.into_message(channel_id, MessageKind::ThreadReply);
                msg.thread_parent_ts = Some(root_ts.to_string());
                msg
            })
            .collect();

        Ok(HistoryPage {
            messages,
            next_cursor: raw.response_metadata.and_then(|m| m.next_cursor).filter(|c| !c.is_empty()),
        })
    }

    pub async fn get_user(&self, user_id: &str) -> ServiceResult<User> {
        if let Some(entry) = self.users.read().get(user_id) {
            if entry.inserted_at.elapsed() < CACHE_TTL {
                return Ok(entry.value.clone());
            }
        }

        let raw: RawUserResponse = self
            .get_json("users.info", &[("user", user_id)])
            .await?;
        let user = raw.user.into_user();

        self.users.write().insert(
            user_id.to_string(),
            CacheEntry {
                value: user.clone(),
                inserted_at: Instant::now(),
            },
        );

        Ok(user)
    }

    pub async fn get_channel(&self, channel_id: &str) -> ServiceResult<Channel> {
        if let Some(entry) = self.channels.read().get(channel_id) {
            if entry.inserted_at.elapsed() < CACHE_TTL {
                return Ok(entry.value.clone());
            }
        }

        let raw: RawChannelResponse = self
            .get_json("conversations.info", &[("channel", channel_id)])
            .await?;
        let channel = raw.channel.into_channel();

        self.channels.write().insert(
            channel_id.to_string(),
            CacheEntry {
                value: channel.clone(),
                inserted_at: Instant::now(),
            },
        );

        Ok(channel)
    }

    /// Resolves a channel name (with or without a leading `#`) to its id by
    /// scanning the TTL cache; used by the search service to translate a
    /// `channel_filter`. Best-effort: returns `None` on a cache miss rather
    /// than issuing a fresh upstream call.
    pub fn resolve_channel_name(&self, name: &str) -> Option<String> {
        let needle = name.trim_start_matches('#').to_lowercase();
        self.channels
            .read()
            .values()
            .find(|e| e.value.name.to_lowercase() == needle)
            .map(|e| e.value.id.clone())
    }

    pub async fn list_reactions(&self, channel_id: &str, ts: &str) -> Vec<Reaction> {
        match self
            .get_json::<RawReactionsResponse>("reactions.get", &[("channel", channel_id), ("timestamp", ts)])
            .await
        {
            Ok(raw) => raw.message.reactions.unwrap_or_default(),
            Err(e) => {
                debug!("best-effort reactions.get failed for {}:{}: {}", channel_id, ts, e);
                Vec::new()
            }
        }
    }

    pub async fn extract_canvas(&self, channel: &Channel) -> Option<Canvas> {
        let canvas_id = channel.canvas_id.as_ref()?;
        match self
            .get_json::<RawCanvasResponse>("canvases.read", &[("canvas_id", canvas_id)])
            .await
        {
            Ok(raw) => Some(Canvas {
                id: canvas_id.clone(),
                title: raw.title,
                body: normalize_text(&raw.markdown),
                channel_id: channel.id.clone(),
            }),
            Err(e) => {
                warn!("canvas extraction failed for channel {}: {}", channel.id, e);
                None
            }
        }
    }
}

pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
}

fn retry_or_timeout(endpoint: &str, e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::UpstreamTimeout {
            provider: format!("chat:{endpoint}"),
        }
    } else {
        ServiceError::UpstreamInvalid {
            provider: "chat".to_string(),
            detail: e.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RawHistoryResponse {
    messages: Vec<RawMessage>,
    response_metadata: Option<RawResponseMetadata>,
}

#[derive(Deserialize)]
struct RawResponseMetadata {
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct RawMessage {
    ts: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    reactions: Option<Vec<RawReaction>>,
}

impl RawMessage {
    fn into_message(self, channel_id: &str, kind: MessageKind) -> Message {
        let is_thread_root = self
            .thread_ts
            .as_deref()
            .map(|t| t == self.ts)
            .unwrap_or(false);

        Message {
            channel_id: channel_id.to_string(),
            ts: self.ts,
            text: normalize_text(&self.text),
            author: self.user,
            thread_parent_ts: None,
            is_thread_root,
            reactions: self
                .reactions
                .unwrap_or_default()
                .into_iter()
                .map(RawReaction::into_reaction)
                .collect(),
            kind,
        }
    }
}

#[derive(Deserialize)]
struct RawReaction {
    name: String,
    users: Vec<String>,
    count: u32,
}

impl RawReaction {
    fn into_reaction(self) -> Reaction {
        Reaction {
            name: self.name,
            users: self.users,
            count: self.count,
        }
    }
}

#[derive(Deserialize)]
struct RawReactionsResponse {
    message: RawReactionsMessage,
}

#[derive(Deserialize)]
struct RawReactionsMessage {
    reactions: Option<Vec<Reaction>>,
}

#[derive(Deserialize)]
struct RawUserResponse {
    user: RawUser,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    real_name: String,
    profile: RawUserProfile,
}

#[derive(Deserialize)]
struct RawUserProfile {
    #[serde(default)]
    display_name: String,
}

impl RawUser {
    fn into_user(self) -> User {
        let display_name = if self.profile.display_name.is_empty() {
            self.real_name.clone()
        } else {
            self.profile.display_name
        };
        User {
            id: self.id,
            display_name,
            real_name: self.real_name,
        }
    }
}

#[derive(Deserialize)]
struct RawChannelResponse {
    channel: RawChannel,
}

#[derive(Deserialize)]
struct RawChannel {
    id: String,
    name: String,
    #[serde(default)]
    is_member: bool,
    #[serde(default)]
    properties: Option<RawChannelProperties>,
}

#[derive(Deserialize)]
struct RawChannelProperties {
    #[serde(default)]
    canvas: Option<RawChannelCanvas>,
}

#[derive(Deserialize)]
struct RawChannelCanvas {
    file_id: String,
}

impl RawChannel {
    fn into_channel(self) -> Channel {
        Channel {
            id: self.id,
            name: self.name,
            is_member: self.is_member,
            canvas_id: self.properties.and_then(|p| p.canvas).map(|c| c.file_id),
        }
    }
}

#[derive(Deserialize)]
struct RawCanvasResponse {
    title: String,
    markdown: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_user_prefers_display_name() {
        let raw = RawUser {
            id: "U1".to_string(),
            real_name: "Jane Doe".to_string(),
            profile: RawUserProfile {
                display_name: "jdoe".to_string(),
            },
        };
        let user = raw.into_user();
        assert_eq!(user.display_name, "jdoe");
        assert_eq!(user.real_name, "Jane Doe");
    }

    #[test]
    fn raw_user_falls_back_to_real_name() {
        let raw = RawUser {
            id: "U1".to_string(),
            real_name: "Jane Doe".to_string(),
            profile: RawUserProfile {
                display_name: String::new(),
            },
        };
        assert_eq!(raw.into_user().display_name, "Jane Doe");
    }
}
