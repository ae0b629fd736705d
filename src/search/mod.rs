// src/search/mod.rs
// Orchestrates enhance -> embed -> filter translation -> vector query ->
// result assembly, with a short-lived response cache in front of it.

pub mod cache;

use crate::chat::ChatClient;
use crate::embedding::EmbeddingClient;
use crate::enhancer::QueryEnhancer;
use crate::error::ServiceResult;
use crate::vector::{QueryFilter, VectorStore};
use cache::ResponseCache;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

const MIN_TOP_K: u32 = 1;
const MAX_TOP_K: u32 = 50;

/// Caller-supplied overrides. Any `Some` short-circuits what `enhance`
/// would otherwise have produced for that field.
#[derive(Debug, Clone, Default)]
pub struct SearchOverrides {
    pub skip_enhancement: bool,
    pub top_k: Option<u32>,
    pub channel_filter: Option<String>,
    pub user_filter: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub channel_name: String,
    pub user_name: String,
    pub ts_iso: String,
    pub text_excerpt: String,
    pub thread_root_ts: Option<String>,
    pub has_reactions: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub enhanced_query: String,
}

pub struct SearchService {
    chat: Arc<ChatClient>,
    embedding: Arc<EmbeddingClient>,
    enhancer: Arc<QueryEnhancer>,
    vector_store: Arc<dyn VectorStore>,
    cache: ResponseCache,
}

impl SearchService {
    pub fn new(
        chat: Arc<ChatClient>,
        embedding: Arc<EmbeddingClient>,
        enhancer: Arc<QueryEnhancer>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            chat,
            embedding,
            enhancer,
            vector_store,
            cache: ResponseCache::new(),
        }
    }

    pub async fn search(&self, raw_query: &str, overrides: SearchOverrides) -> ServiceResult<SearchResponse> {
        let started = Instant::now();
        let result = self.search_inner(raw_query, overrides).await;
        crate::metrics::record_search_latency(started.elapsed().as_secs_f64());
        result
    }

    async fn search_inner(&self, raw_query: &str, overrides: SearchOverrides) -> ServiceResult<SearchResponse> {
        let enhanced_text;
        let mut top_k;
        let mut channel_filter;
        let mut user_filter;
        let mut date_from;
        let mut date_to;

        if overrides.skip_enhancement {
            enhanced_text = raw_query.to_string();
            top_k = overrides.top_k.unwrap_or(10);
            channel_filter = None;
            user_filter = None;
            date_from = None;
            date_to = None;
        } else {
            let enhanced = self.enhancer.enhance(raw_query).await;
            enhanced_text = enhanced.enhanced_text;
            top_k = enhanced.top_k;
            channel_filter = enhanced.channel_filter;
            user_filter = enhanced.user_filter;
            date_from = enhanced.date_from;
            date_to = enhanced.date_to;
        }

        if let Some(override_top_k) = overrides.top_k {
            top_k = override_top_k;
        }
        if overrides.channel_filter.is_some() {
            channel_filter = overrides.channel_filter.clone();
        }
        if overrides.user_filter.is_some() {
            user_filter = overrides.user_filter.clone();
        }
        if overrides.date_from.is_some() {
            date_from = overrides.date_from.clone();
        }
        if overrides.date_to.is_some() {
            date_to = overrides.date_to.clone();
        }

        let top_k = top_k.clamp(MIN_TOP_K, MAX_TOP_K);

        let channel_id = channel_filter.as_deref().and_then(|name| self.chat.resolve_channel_name(name));
        let user_id = user_filter.clone();

        let cache_key = cache::generate_key(
            &enhanced_text,
            top_k,
            channel_id.as_deref(),
            user_id.as_deref(),
            date_from.as_deref(),
            date_to.as_deref(),
        );

        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        let vector = self.embedding.embed(&enhanced_text).await?;

        let filter = QueryFilter {
            channel_id,
            user_id,
            date_from: date_from.as_deref().and_then(parse_date_from),
            date_to: date_to.as_deref().and_then(parse_date_to),
        };

        let hits = self.vector_store.query(&vector, top_k as usize, &filter).await?;

        let results = hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                score: hit.score,
                channel_name: hit.metadata.channel_name,
                user_name: hit.metadata.user_name,
                ts_iso: hit.metadata.iso_date,
                text_excerpt: hit.metadata.text_excerpt,
                thread_root_ts: hit.metadata.thread_root_ts,
                has_reactions: hit.metadata.has_reactions,
            })
            .collect::<Vec<_>>();

        let response = SearchResponse {
            total: results.len(),
            results,
            enhanced_query: enhanced_text,
        };

        self.cache.put(cache_key, response.clone());
        Ok(response)
    }
}

/// Anchors an inclusive `YYYY-MM-DD` lower bound at `00:00:00` UTC.
fn parse_date_from(date: &str) -> Option<chrono::DateTime<Utc>> {
    let naive = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Utc.from_local_datetime(&naive.and_hms_opt(0, 0, 0)?).single()
}

/// Anchors an inclusive `YYYY-MM-DD` upper bound at `23:59:59` UTC.
fn parse_date_to(date: &str) -> Option<chrono::DateTime<Utc>> {
    let naive = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Utc.from_local_datetime(&naive.and_hms_opt(23, 59, 59)?).single()
}
