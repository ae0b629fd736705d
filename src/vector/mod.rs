// src/vector/mod.rs
// Uniform vector-store interface, backed by either a remote index or a
// local file-backed fallback, selected at startup by configuration.

pub mod local_store;
pub mod qdrant_store;

pub use local_store::LocalVectorStore;
pub use qdrant_store::QdrantVectorStore;

use crate::error::ServiceResult;
use crate::models::{EmbeddingVector, Metadata};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub date_from: Option<chrono::DateTime<chrono::Utc>>,
    pub date_to: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone)]
pub struct VectorStats {
    pub total_vectors: u64,
    pub channels: Vec<String>,
    pub last_upsert_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, batch: Vec<(String, EmbeddingVector, Metadata)>) -> ServiceResult<()>;

    async fn query(
        &self,
        vector: &EmbeddingVector,
        top_k: usize,
        filter: &QueryFilter,
    ) -> ServiceResult<Vec<ScoredHit>>;

    async fn stats(&self) -> ServiceResult<VectorStats>;

    async fn delete_by_channel(&self, channel_id: &str) -> ServiceResult<()>;

    async fn health_check(&self) -> bool;
}

/// Cosine similarity between two equal-length dense vectors. Shared by the
/// local fallback's brute-force scan and by tests exercising ranking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn metadata_matches(metadata: &Metadata, filter: &QueryFilter) -> bool {
    if let Some(ref channel_id) = filter.channel_id {
        if &metadata.channel_id != channel_id {
            return false;
        }
    }
    if let Some(ref user_id) = filter.user_id {
        if &metadata.user_id != user_id {
            return false;
        }
    }
    if let Some(from) = filter.date_from {
        let Ok(ts) = chrono::DateTime::parse_from_rfc3339(&metadata.iso_date) else {
            return false;
        };
        if ts.with_timezone(&chrono::Utc) < from {
            return false;
        }
    }
    if let Some(to) = filter.date_to {
        let Ok(ts) = chrono::DateTime::parse_from_rfc3339(&metadata.iso_date) else {
            return false;
        };
        if ts.with_timezone(&chrono::Utc) > to {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_has_similarity_zero() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
