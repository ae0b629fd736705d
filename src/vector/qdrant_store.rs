// src/vector/qdrant_store.rs
// Remote vector index backend: a single collection of message vectors,
// simplified from a multi-collection design since this service has
// exactly one kind of vector.

use super::{metadata_matches, QueryFilter, ScoredHit, VectorStats, VectorStore};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{EmbeddingVector, Metadata, MessageKind, EMBEDDING_DIM};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorStore {
    pub async fn new(url: &str, collection: &str) -> anyhow::Result<Self> {
        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| anyhow::anyhow!("failed to connect to vector index: {e}"))?;

        let store = Self {
            client,
            collection: collection.to_string(),
        };
        store.ensure_collection().await?;
        Ok(store)
    }

    async fn ensure_collection(&self) -> anyhow::Result<()> {
        let exists = self.client.collection_exists(&self.collection).await?;
        if exists {
            return Ok(());
        }

        info!("creating vector collection: {}", self.collection);
        match self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine)),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.to_string().contains("already exists") {
                    debug!("collection {} already exists", self.collection);
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("failed to create collection {}: {e}", self.collection))
                }
            }
        }
    }

    fn build_filter(filter: &QueryFilter) -> Option<Filter> {
        let mut conditions = Vec::new();
        if let Some(ref channel_id) = filter.channel_id {
            conditions.push(Condition::matches("channel_id", channel_id.clone()));
        }
        if let Some(ref user_id) = filter.user_id {
            conditions.push(Condition::matches("user_id", user_id.clone()));
        }
        if conditions.is_empty() {
            None
        } else {
            Some(Filter::must(conditions))
        }
    }

    fn numeric_id(vector_id: &str) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        vector_id.hash(&mut hasher);
        hasher.finish()
    }

    fn payload_from(metadata: &Metadata) -> HashMap<String, QdrantValue> {
        let mut payload: HashMap<String, QdrantValue> = HashMap::new();
        payload.insert("channel_id".to_string(), metadata.channel_id.clone().into());
        payload.insert("channel_name".to_string(), metadata.channel_name.clone().into());
        payload.insert("user_id".to_string(), metadata.user_id.clone().into());
        payload.insert("user_name".to_string(), metadata.user_name.clone().into());
        payload.insert("ts".to_string(), metadata.ts.clone().into());
        payload.insert("iso_date".to_string(), metadata.iso_date.clone().into());
        if let Some(ref root) = metadata.thread_root_ts {
            payload.insert("thread_root_ts".to_string(), root.clone().into());
        }
        payload.insert("kind".to_string(), kind_str(metadata.kind).to_string().into());
        payload.insert("has_reactions".to_string(), metadata.has_reactions.into());
        payload.insert("chunk_index".to_string(), (metadata.chunk_index as i64).into());
        payload.insert("chunk_total".to_string(), (metadata.chunk_total as i64).into());
        payload.insert("text_excerpt".to_string(), metadata.text_excerpt.clone().into());
        payload
    }

    fn metadata_from(payload: &HashMap<String, QdrantValue>) -> Option<Metadata> {
        Some(Metadata {
            channel_id: payload.get("channel_id")?.as_str()?.to_string(),
            channel_name: payload.get("channel_name")?.as_str()?.to_string(),
            user_id: payload.get("user_id")?.as_str()?.to_string(),
            user_name: payload.get("user_name")?.as_str()?.to_string(),
            ts: payload.get("ts")?.as_str()?.to_string(),
            iso_date: payload.get("iso_date")?.as_str()?.to_string(),
            thread_root_ts: payload.get("thread_root_ts").and_then(|v| v.as_str()).map(String::from),
            kind: payload
                .get("kind")
                .and_then(|v| v.as_str())
                .map(kind_from_str)
                .unwrap_or(MessageKind::Message),
            has_reactions: payload.get("has_reactions").and_then(|v| v.as_bool()).unwrap_or(false),
            chunk_index: payload.get("chunk_index").and_then(|v| v.as_integer()).unwrap_or(0) as u32,
            chunk_total: payload.get("chunk_total").and_then(|v| v.as_integer()).unwrap_or(1) as u32,
            text_excerpt: payload.get("text_excerpt").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        })
    }
}

fn kind_str(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Message => "message",
        MessageKind::ThreadReply => "thread_reply",
        MessageKind::Canvas => "canvas",
        MessageKind::RichPost => "rich_post",
    }
}

fn kind_from_str(s: &str) -> MessageKind {
    match s {
        "thread_reply" => MessageKind::ThreadReply,
        "canvas" => MessageKind::Canvas,
        "rich_post" => MessageKind::RichPost,
        _ => MessageKind::Message,
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(&self, batch: Vec<(String, EmbeddingVector, Metadata)>) -> ServiceResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = batch
            .iter()
            .map(|(id, vector, metadata)| {
                PointStruct::new(Self::numeric_id(id), vector.clone(), Self::payload_from(metadata))
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| ServiceError::PersistenceWriteFailed(e.to_string()))?;

        Ok(())
    }

    async fn query(
        &self,
        vector: &EmbeddingVector,
        top_k: usize,
        filter: &QueryFilter,
    ) -> ServiceResult<Vec<ScoredHit>> {
        let mut builder = SearchPointsBuilder::new(&self.collection, vector.clone(), top_k as u64)
            .with_payload(true);
        if let Some(f) = Self::build_filter(filter) {
            builder = builder.filter(f);
        }

        let results = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| ServiceError::UpstreamInvalid {
                provider: "vector".to_string(),
                detail: e.to_string(),
            })?;

        let mut hits: Vec<ScoredHit> = results
            .result
            .into_iter()
            .filter_map(|point| {
                let metadata = Self::metadata_from(&point.payload)?;
                if !metadata_matches(&metadata, filter) {
                    return None;
                }
                Some(ScoredHit {
                    id: metadata.vector_id(),
                    score: point.score,
                    metadata,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.metadata.ts.cmp(&a.metadata.ts))
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn stats(&self) -> ServiceResult<VectorStats> {
        let mut channels = std::collections::HashSet::new();
        let mut total = 0u64;
        let mut offset: Option<qdrant_client::qdrant::PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .limit(100)
                .with_payload(true)
                .with_vectors(false);
            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| ServiceError::UpstreamInvalid {
                    provider: "vector".to_string(),
                    detail: e.to_string(),
                })?;

            if response.result.is_empty() {
                break;
            }

            for point in &response.result {
                total += 1;
                if let Some(channel_id) = point.payload.get("channel_id").and_then(|v| v.as_str()) {
                    channels.insert(channel_id.to_string());
                }
            }

            let got = response.result.len();
            offset = response.result.last().and_then(|p| p.id.clone());
            if got < 100 {
                break;
            }
        }

        Ok(VectorStats {
            total_vectors: total,
            channels: channels.into_iter().collect(),
            last_upsert_at: None,
        })
    }

    async fn delete_by_channel(&self, channel_id: &str) -> ServiceResult<()> {
        let filter = Filter::must([Condition::matches("channel_id", channel_id.to_string())]);
        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(filter).wait(true))
            .await
            .map_err(|e| ServiceError::PersistenceWriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self.client.collection_exists(&self.collection).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("vector health check failed: {}", e);
                false
            }
        }
    }
}
