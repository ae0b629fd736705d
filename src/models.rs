// src/models.rs
// Domain types shared across the ingestion pipeline and the search service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub real_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub is_member: bool,
    pub canvas_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub name: String,
    pub users: Vec<String>,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Canvas {
    pub id: String,
    pub title: String,
    pub body: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Message,
    ThreadReply,
    Canvas,
    RichPost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub channel_id: String,
    pub ts: String,
    pub text: String,
    pub author: String,
    pub thread_parent_ts: Option<String>,
    pub is_thread_root: bool,
    pub reactions: Vec<Reaction>,
    pub kind: MessageKind,
}

impl Message {
    /// Stable identity used to derive the vector id.
    pub fn identity(&self) -> (String, String) {
        (self.channel_id.clone(), self.ts.clone())
    }
}

/// A single embedding vector, 1536-dimensional
/// (text-embedding-3-small-equivalent output).
pub type EmbeddingVector = Vec<f32>;

pub const EMBEDDING_DIM: usize = 1536;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
    pub ts: String,
    pub iso_date: String,
    pub thread_root_ts: Option<String>,
    pub kind: MessageKind,
    pub has_reactions: bool,
    pub chunk_index: u32,
    pub chunk_total: u32,
    pub text_excerpt: String,
}

impl Metadata {
    pub fn vector_id(&self) -> String {
        if self.chunk_total <= 1 {
            format!("{}:{}", self.channel_id, self.ts)
        } else {
            format!("{}:{}:{}", self.channel_id, self.ts, self.chunk_index)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelIngestionState {
    pub last_ingested_ts: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub message_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestionState {
    pub run_id: u64,
    pub channels: std::collections::HashMap<String, ChannelIngestionState>,
    pub first_run_completed: bool,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub subject: String,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
