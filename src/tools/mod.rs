// src/tools/mod.rs
// Tool registry: exactly three tools, each with an input schema validated
// in `schema` before the handler runs.

pub mod schema;

use crate::chat::ChatClient;
use crate::error::{ServiceError, ServiceResult};
use crate::ingest::state::IngestionStateStore;
use crate::search::{SearchOverrides, SearchService};
use crate::vector::VectorStore;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
struct ChannelSummary {
    id: String,
    name: String,
    is_member: bool,
}

#[derive(Debug, Clone, Serialize)]
struct StatsResult {
    total_vectors: u64,
    channels_indexed: usize,
    last_ingested_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct Registry {
    chat: Arc<ChatClient>,
    search: Arc<SearchService>,
    vector_store: Arc<dyn VectorStore>,
    ingestion_state: Arc<IngestionStateStore>,
    configured_channels: Vec<String>,
}

impl Registry {
    pub fn new(
        chat: Arc<ChatClient>,
        search: Arc<SearchService>,
        vector_store: Arc<dyn VectorStore>,
        ingestion_state: Arc<IngestionStateStore>,
        configured_channels: Vec<String>,
    ) -> Self {
        Self {
            chat,
            search,
            vector_store,
            ingestion_state,
            configured_channels,
        }
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "search_messages",
                description: "Semantic search over indexed chat history",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "maxLength": 1000},
                        "top_k": {"type": "integer", "minimum": 1, "maximum": 50},
                        "channel_filter": {"type": "string"},
                        "user_filter": {"type": "string"},
                        "date_from": {"type": "string", "pattern": "^\\d{4}-\\d{2}-\\d{2}$"},
                        "date_to": {"type": "string", "pattern": "^\\d{4}-\\d{2}-\\d{2}$"}
                    },
                    "required": ["query"]
                }),
            },
            ToolDescriptor {
                name: "list_channels",
                description: "List the channels configured for ingestion",
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDescriptor {
                name: "stats",
                description: "Report index size and last ingestion time",
                input_schema: json!({"type": "object", "properties": {}}),
            },
        ]
    }

    pub async fn call(&self, name: &str, params: &Value) -> ServiceResult<Value> {
        match name {
            "search_messages" => self.search_messages(params).await,
            "list_channels" => self.list_channels().await,
            "stats" => self.stats().await,
            other => Err(ServiceError::MethodNotFound(other.to_string())),
        }
    }

    async fn search_messages(&self, params: &Value) -> ServiceResult<Value> {
        let input = schema::parse_search_messages(params)?;

        let overrides = SearchOverrides {
            skip_enhancement: false,
            top_k: input.top_k,
            channel_filter: input.channel_filter,
            user_filter: input.user_filter,
            date_from: input.date_from,
            date_to: input.date_to,
        };

        let response = self.search.search(&input.query, overrides).await?;
        serde_json::to_value(response).map_err(|e| ServiceError::Other(e.into()))
    }

    async fn list_channels(&self) -> ServiceResult<Value> {
        let mut summaries = Vec::with_capacity(self.configured_channels.len());
        for channel_id in &self.configured_channels {
            match self.chat.get_channel(channel_id).await {
                Ok(channel) => summaries.push(ChannelSummary {
                    id: channel.id,
                    name: channel.name,
                    is_member: channel.is_member,
                }),
                Err(e) => {
                    tracing::warn!("list_channels: failed to resolve {}: {}", channel_id, e);
                }
            }
        }
        serde_json::to_value(summaries).map_err(|e| ServiceError::Other(e.into()))
    }

    async fn stats(&self) -> ServiceResult<Value> {
        let vector_stats = self.vector_store.stats().await?;
        let ingestion = self.ingestion_state.snapshot();

        let last_ingested_at = ingestion
            .channels
            .values()
            .filter_map(|c| c.last_success_at)
            .max();

        let result = StatsResult {
            total_vectors: vector_stats.total_vectors,
            channels_indexed: vector_stats.channels.len(),
            last_ingested_at,
        };

        serde_json::to_value(result).map_err(|e| ServiceError::Other(e.into()))
    }
}
