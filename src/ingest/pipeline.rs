// src/ingest/pipeline.rs
// Per-channel ingestion: fetch -> normalize -> embed -> upsert -> checkpoint.

use super::state::IngestionStateStore;
use crate::chat::ChatClient;
use crate::embedding::{chunk_text, EmbeddingClient};
use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::models::{Message, MessageKind, Metadata};
use crate::vector::VectorStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

const UPSERT_BATCH: usize = 100;
const EXCERPT_LEN: usize = 300;
const REPLY_TAIL_COUNT: usize = 3;
const REPLY_EXCERPT_LEN: usize = 160;

pub struct ChannelRunReport {
    pub channel_id: String,
    pub messages_processed: u64,
    pub messages_embedded: u64,
    pub messages_upserted: u64,
    pub failed: bool,
}

pub struct IngestPipeline {
    chat: Arc<ChatClient>,
    embedding: Arc<EmbeddingClient>,
    vector_store: Arc<dyn VectorStore>,
    state: Arc<IngestionStateStore>,
}

impl IngestPipeline {
    pub fn new(
        chat: Arc<ChatClient>,
        embedding: Arc<EmbeddingClient>,
        vector_store: Arc<dyn VectorStore>,
        state: Arc<IngestionStateStore>,
    ) -> Self {
        Self {
            chat,
            embedding,
            vector_store,
            state,
        }
    }

    /// Runs one ingestion pass over a single channel, in isolation: a
    /// failure here never aborts sibling channel runs.
    pub async fn run_channel(&self, channel_id: &str) -> ChannelRunReport {
        let mut report = ChannelRunReport {
            channel_id: channel_id.to_string(),
            messages_processed: 0,
            messages_embedded: 0,
            messages_upserted: 0,
            failed: false,
        };

        let channel = match self.chat.get_channel(channel_id).await {
            Ok(c) if c.is_member => c,
            Ok(_) => {
                warn!("skipping channel {} - bot is not a member", channel_id);
                return report;
            }
            Err(e) => {
                error!("failed to resolve channel {}: {}", channel_id, e);
                report.failed = true;
                return report;
            }
        };

        let since = self.state.last_ingested_ts(channel_id);
        let is_initial_run = since.is_none();

        let mut messages = match self.collect_messages(channel_id, since.as_deref()).await {
            Ok(m) => m,
            Err(e) => {
                self.classify_and_log(channel_id, &e);
                report.failed = matches!(e.kind(), ErrorKind::EmbeddingDimensionMismatch);
                return report;
            }
        };

        if is_initial_run {
            if let Some(canvas) = self.chat.extract_canvas(&channel).await {
                if !canvas.body.trim().is_empty() {
                    messages.push(Message {
                        channel_id: channel.id.clone(),
                        ts: "0".to_string(),
                        text: canvas.body,
                        author: "canvas".to_string(),
                        thread_parent_ts: None,
                        is_thread_root: false,
                        reactions: Vec::new(),
                        kind: MessageKind::Canvas,
                    });
                }
            }
        }

        messages.retain(|m| !m.text.trim().is_empty());
        report.messages_processed = messages.len() as u64;

        if messages.is_empty() {
            return report;
        }

        let highest_ts = messages
            .iter()
            .filter(|m| m.kind != MessageKind::Canvas)
            .map(|m| m.ts.clone())
            .max_by(|a, b| {
                a.parse::<f64>()
                    .unwrap_or(0.0)
                    .partial_cmp(&b.parse::<f64>().unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        for batch in messages.chunks(UPSERT_BATCH) {
            match self.embed_and_upsert(&channel.name, batch).await {
                Ok(count) => {
                    report.messages_embedded += batch.len() as u64;
                    report.messages_upserted += count;
                }
                Err(e) => {
                    self.classify_and_log(channel_id, &e);
                    if matches!(e.kind(), ErrorKind::EmbeddingDimensionMismatch) {
                        report.failed = true;
                        return report;
                    }
                }
            }
        }

        if let Some(ts) = highest_ts {
            if let Err(e) = self.state.advance(channel_id, &ts, report.messages_processed) {
                error!("failed to write checkpoint for channel {}: {}", channel_id, e);
            }
        }

        crate::metrics::record_ingestion_run(channel_id, report.messages_upserted);

        info!(
            "channel {} run complete: processed={} embedded={} upserted={}",
            channel_id, report.messages_processed, report.messages_embedded, report.messages_upserted
        );

        report
    }

    async fn collect_messages(&self, channel_id: &str, since: Option<&str>) -> ServiceResult<Vec<Message>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.chat.history_page(channel_id, since, cursor.as_deref()).await?;
            for root in page.messages {
                if root.is_thread_root {
                    match self.collect_thread(channel_id, &root.ts).await {
                        Ok(mut replies) => all.append(&mut replies),
                        Err(e) => warn!("failed to fetch thread {}:{}: {}", channel_id, root.ts, e),
                    }
                }
                all.push(root);
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(all)
    }

    async fn collect_thread(&self, channel_id: &str, root_ts: &str) -> ServiceResult<Vec<Message>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.chat.thread_replies_page(channel_id, root_ts, cursor.as_deref()).await?;
            let done = page.next_cursor.is_none();
            all.extend(page.messages);
            if done {
                break;
            }
            cursor = page.next_cursor;
        }

        Ok(all)
    }

    /// Builds the text sent to the embedder: cleaned body, reaction summary,
    /// author display name, and (for a thread root whose replies are present
    /// in this batch) a bounded tail of reply excerpts. Chunks and embeds
    /// each message, upserting each chunk with shared metadata except
    /// `chunk_index`.
    async fn embed_and_upsert(&self, channel_name: &str, messages: &[Message]) -> ServiceResult<u64> {
        let mut plans: Vec<(Message, String, Vec<String>)> = Vec::new();
        let mut display_names: HashMap<String, String> = HashMap::new();

        for message in messages {
            let display_name = self.resolve_author_name(message, &mut display_names).await;

            let mut text = message.text.clone();

            if !message.reactions.is_empty() {
                let summary: Vec<String> = message
                    .reactions
                    .iter()
                    .map(|r| format!(":{}: x{}", r.name, r.count))
                    .collect();
                text.push_str(&format!("\nreactions: {}", summary.join(", ")));
            }

            text.push_str(&format!("\nauthor: {}", display_name));

            if message.is_thread_root {
                let replies = reply_tail(messages, &message.ts);
                if !replies.is_empty() {
                    let excerpts: Vec<String> = replies
                        .iter()
                        .map(|r| r.text.chars().take(REPLY_EXCERPT_LEN).collect())
                        .collect();
                    text.push_str(&format!("\nreplies: {}", excerpts.join(" | ")));
                }
            }

            let chunks = chunk_text(&text, self.embedding.chunk_size(), self.embedding.chunk_overlap());
            plans.push((message.clone(), display_name, chunks));
        }

        let flat_texts: Vec<String> = plans.iter().flat_map(|(_, _, chunks)| chunks.clone()).collect();
        let vectors = self.embedding.embed_many(&flat_texts).await?;

        let mut upserts = Vec::new();
        let mut cursor = 0usize;

        for (message, display_name, chunks) in &plans {
            let chunk_total = chunks.len() as u32;
            for (chunk_index, chunk) in chunks.iter().enumerate() {
                let vector = vectors[cursor].clone();
                cursor += 1;

                let metadata = Metadata {
                    channel_id: message.channel_id.clone(),
                    channel_name: channel_name.to_string(),
                    user_id: message.author.clone(),
                    user_name: display_name.clone(),
                    ts: message.ts.clone(),
                    iso_date: ts_to_iso(&message.ts),
                    thread_root_ts: message.thread_parent_ts.clone(),
                    kind: message.kind,
                    has_reactions: !message.reactions.is_empty(),
                    chunk_index: chunk_index as u32,
                    chunk_total,
                    text_excerpt: chunk.chars().take(EXCERPT_LEN).collect(),
                };

                let id = metadata.vector_id();
                upserts.push((id, vector, metadata));
            }
        }

        let count = upserts.len() as u64;
        self.vector_store.upsert(upserts).await?;
        Ok(count)
    }

    /// Resolves a message author to a display name via the 24h-TTL user
    /// cache, falling back to the raw author id if the lookup fails.
    /// Canvas messages have no real author to resolve.
    async fn resolve_author_name(&self, message: &Message, cache: &mut HashMap<String, String>) -> String {
        if message.kind == MessageKind::Canvas {
            return message.author.clone();
        }
        if let Some(cached) = cache.get(&message.author) {
            return cached.clone();
        }

        let name = match self.chat.get_user(&message.author).await {
            Ok(user) => user.display_name,
            Err(e) => {
                warn!("failed to resolve display name for user {}: {}", message.author, e);
                message.author.clone()
            }
        };

        cache.insert(message.author.clone(), name.clone());
        name
    }

    fn classify_and_log(&self, channel_id: &str, error: &ServiceError) {
        match error.kind() {
            ErrorKind::UpstreamThrottled | ErrorKind::UpstreamTimeout => {
                warn!("transient failure in channel {}: {}", channel_id, error);
            }
            ErrorKind::UpstreamInvalid => {
                warn!("dropping invalid item in channel {}: {}", channel_id, error);
            }
            ErrorKind::EmbeddingDimensionMismatch => {
                error!("fatal failure in channel {}: {}", channel_id, error);
            }
            _ => {
                error!("unclassified failure in channel {}: {}", channel_id, error);
            }
        }
    }
}

fn ts_to_iso(ts: &str) -> String {
    let secs: f64 = ts.parse().unwrap_or(0.0);
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

/// The last `REPLY_TAIL_COUNT` replies to `root_ts` present in this batch,
/// in arrival order.
fn reply_tail<'a>(messages: &'a [Message], root_ts: &str) -> Vec<&'a Message> {
    let mut replies: Vec<&Message> = messages
        .iter()
        .filter(|m| m.thread_parent_ts.as_deref() == Some(root_ts))
        .collect();

    let start = replies.len().saturating_sub(REPLY_TAIL_COUNT);
    replies.split_off(start)
}
