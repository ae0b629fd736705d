// src/lib.rs
// Library surface: modules re-exported for the binary and for tests.

pub mod chat;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod enhancer;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod search;
pub mod server;
pub mod tools;
pub mod vector;

use chat::ChatClient;
use config::AppConfig;
use embedding::EmbeddingClient;
use enhancer::QueryEnhancer;
use ingest::IngestionScheduler;
use rate_limit::{Provider, RateGovernor};
use search::SearchService;
use server::AppState;
use std::collections::HashMap;
use std::sync::Arc;
use tools::Registry;
use vector::{LocalVectorStore, QdrantVectorStore, VectorStore};

/// Everything the binary needs to run any of its three modes, built once
/// from `AppConfig`.
pub struct Service {
    pub config: AppConfig,
    pub chat: Arc<ChatClient>,
    pub embedding: Arc<EmbeddingClient>,
    pub enhancer: Arc<QueryEnhancer>,
    pub vector_store: Arc<dyn VectorStore>,
    pub search: Arc<SearchService>,
    pub ingestion: IngestionScheduler,
    pub governor: Arc<RateGovernor>,
}

impl Service {
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let mut defaults = HashMap::new();
        defaults.insert(Provider::Chat, config.rate_limit.chat_per_minute);
        defaults.insert(Provider::Embedding, config.rate_limit.embedding_per_minute);
        defaults.insert(Provider::Enhancer, config.rate_limit.enhancer_per_minute);
        defaults.insert(Provider::RequestServer, config.rate_limit.request_server_per_minute);
        let governor = Arc::new(RateGovernor::new(defaults));

        let chat = Arc::new(ChatClient::new(config.chat.clone(), governor.clone()));
        let embedding = Arc::new(EmbeddingClient::new(config.embedding.clone(), governor.clone()));
        let enhancer = Arc::new(QueryEnhancer::new(config.enhancer.clone(), governor.clone()));

        let vector_store: Arc<dyn VectorStore> = if config.vector.use_remote() {
            Arc::new(QdrantVectorStore::new(&config.vector.url, &config.vector.index_name).await?)
        } else {
            Arc::new(LocalVectorStore::load(&config.vector.local_path)?)
        };

        let search = Arc::new(SearchService::new(
            chat.clone(),
            embedding.clone(),
            enhancer.clone(),
            vector_store.clone(),
        ));

        let ingestion = IngestionScheduler::new(
            chat.clone(),
            embedding.clone(),
            vector_store.clone(),
            config.chat.channels.clone(),
            config.scheduler.clone(),
        );

        Ok(Self {
            config,
            chat,
            embedding,
            enhancer,
            vector_store,
            search,
            ingestion,
            governor,
        })
    }

    pub fn build_app_state(&self) -> Arc<AppState> {
        let registry = Registry::new(
            self.chat.clone(),
            self.search.clone(),
            self.vector_store.clone(),
            self.ingestion.state(),
            self.config.chat.channels.clone(),
        );

        Arc::new(AppState {
            registry,
            sessions: server::session::SessionStore::new(self.config.server.session_ttl_hours),
            governor: self.governor.clone(),
            whitelist_keys: self.config.server.whitelist_keys.clone(),
        })
    }
}
