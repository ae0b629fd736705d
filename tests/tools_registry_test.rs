// tests/tools_registry_test.rs
// Tool dispatch for an unknown tool name must fail with -32601 and touch
// no state.

use chatter_search::chat::ChatClient;
use chatter_search::config::{ChatConfig, EmbeddingConfig, EnhancerConfig};
use chatter_search::embedding::EmbeddingClient;
use chatter_search::enhancer::QueryEnhancer;
use chatter_search::ingest::state::IngestionStateStore;
use chatter_search::rate_limit::{Provider, RateGovernor};
use chatter_search::search::SearchService;
use chatter_search::tools::Registry;
use chatter_search::vector::{LocalVectorStore, VectorStore};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn governor() -> Arc<RateGovernor> {
    let mut defaults = HashMap::new();
    defaults.insert(Provider::Chat, 1000);
    defaults.insert(Provider::Embedding, 1000);
    defaults.insert(Provider::Enhancer, 1000);
    Arc::new(RateGovernor::new(defaults))
}

async fn build_registry(dir: &std::path::Path) -> Registry {
    let gov = governor();
    let chat = Arc::new(ChatClient::new(
        ChatConfig {
            bot_token: "xoxb-test".to_string(),
            channels: vec![],
            base_url: "http://127.0.0.1:1".to_string(),
        },
        gov.clone(),
    ));
    let embedding = Arc::new(EmbeddingClient::new(
        EmbeddingConfig {
            api_key: "sk-test".to_string(),
            model: "text-embedding-3-small".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            chunk_size: 8000,
            chunk_overlap: 200,
            batch_size: 64,
        },
        gov.clone(),
    ));
    let enhancer = Arc::new(QueryEnhancer::new(
        EnhancerConfig {
            api_key: "sk-test".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            system_prompt: "unused".to_string(),
            temperature: 0.1,
            max_tokens: 512,
        },
        gov,
    ));
    let vector_store: Arc<dyn VectorStore> =
        Arc::new(LocalVectorStore::load(dir.join("vectors.ndjson")).unwrap());
    let search = Arc::new(SearchService::new(chat.clone(), embedding, enhancer, vector_store.clone()));
    let ingestion_state = Arc::new(IngestionStateStore::load(dir.join("state.json")));

    Registry::new(chat, search, vector_store, ingestion_state, vec![])
}

#[tokio::test]
async fn unknown_tool_name_returns_method_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let registry = build_registry(dir.path()).await;

    let err = registry.call("delete_everything", &json!({})).await.unwrap_err();

    assert_eq!(err.rpc_code(), -32601);
}

#[tokio::test]
async fn stats_reports_an_empty_index_before_any_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let registry = build_registry(dir.path()).await;

    let result = registry.call("stats", &json!({})).await.unwrap();

    assert_eq!(result["total_vectors"], 0);
    assert_eq!(result["channels_indexed"], 0);
    assert!(result["last_ingested_at"].is_null());
}

#[tokio::test]
async fn list_channels_on_empty_configuration_returns_empty_list() {
    let dir = tempfile::tempdir().unwrap();
    let registry = build_registry(dir.path()).await;

    let result = registry.call("list_channels", &json!({})).await.unwrap();

    assert_eq!(result.as_array().unwrap().len(), 0);
}
