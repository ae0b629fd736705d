// src/vector/local_store.rs
// File-backed fallback used when no remote vector index is configured.
// Brute-force cosine scan over an in-memory map, periodically compacted to
// an append-only NDJSON file. The atomic write-temp-then-rename idiom
// mirrors this crate's ingestion checkpoint writer.

use super::{cosine_similarity, metadata_matches, QueryFilter, ScoredHit, VectorStats, VectorStore};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{EmbeddingVector, Metadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    id: String,
    vector: EmbeddingVector,
    metadata: Metadata,
}

struct Inner {
    points: HashMap<String, StoredPoint>,
    last_upsert_at: Option<DateTime<Utc>>,
    dirty_since_flush: usize,
}

pub struct LocalVectorStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

const FLUSH_EVERY: usize = 50;

impl LocalVectorStore {
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut points = HashMap::new();

        if let Ok(contents) = std::fs::read_to_string(&path) {
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<StoredPoint>(line) {
                    Ok(point) => {
                        points.insert(point.id.clone(), point);
                    }
                    Err(e) => warn!("skipping malformed line in {}: {}", path.display(), e),
                }
            }
        }

        info!("loaded {} vectors from local fallback store {}", points.len(), path.display());

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                points,
                last_upsert_at: None,
                dirty_since_flush: 0,
            }),
        })
    }

    fn flush(&self, inner: &Inner) -> ServiceResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ServiceError::PersistenceWriteFailed(e.to_string()))?;
        }

        let tmp_path = self.path.with_extension("ndjson.tmp");
        let mut buf = String::new();
        for point in inner.points.values() {
            buf.push_str(&serde_json::to_string(point).map_err(|e| ServiceError::PersistenceWriteFailed(e.to_string()))?);
            buf.push('\n');
        }

        std::fs::write(&tmp_path, buf).map_err(|e| ServiceError::PersistenceWriteFailed(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| ServiceError::PersistenceWriteFailed(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn upsert(&self, batch: Vec<(String, EmbeddingVector, Metadata)>) -> ServiceResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let should_flush = {
            let mut inner = self.inner.lock();
            for (id, vector, metadata) in batch {
                inner.points.insert(
                    id.clone(),
                    StoredPoint { id, vector, metadata },
                );
            }
            inner.last_upsert_at = Some(Utc::now());
            inner.dirty_since_flush += 1;
            inner.dirty_since_flush >= FLUSH_EVERY
        };

        if should_flush {
            let inner = self.inner.lock();
            self.flush(&inner)?;
            drop(inner);
            self.inner.lock().dirty_since_flush = 0;
        }

        Ok(())
    }

    async fn query(
        &self,
        vector: &EmbeddingVector,
        top_k: usize,
        filter: &QueryFilter,
    ) -> ServiceResult<Vec<ScoredHit>> {
        let inner = self.inner.lock();

        let mut hits: Vec<ScoredHit> = inner
            .points
            .values()
            .filter(|p| metadata_matches(&p.metadata, filter))
            .map(|p| ScoredHit {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.vector),
                metadata: p.metadata.clone(),
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
        let inner = self.inner.lock();
        let channels: std::collections::HashSet<String> =
            inner.points.values().map(|p| p.metadata.channel_id.clone()).collect();

        Ok(VectorStats {
            total_vectors: inner.points.len() as u64,
            channels: channels.into_iter().collect(),
            last_upsert_at: inner.last_upsert_at,
        })
    }

    async fn delete_by_channel(&self, channel_id: &str) -> ServiceResult<()> {
        let mut inner = self.inner.lock();
        inner.points.retain(|_, p| p.metadata.channel_id != channel_id);
        self.flush(&inner)?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
