// tests/ingestion_flow_test.rs
// End-to-end ingestion through a mocked chat platform and embedding
// provider, writing into a file-backed local vector store.

use chatter_search::chat::ChatClient;
use chatter_search::config::{ChatConfig, EmbeddingConfig};
use chatter_search::embedding::EmbeddingClient;
use chatter_search::ingest::pipeline::IngestPipeline;
use chatter_search::ingest::state::IngestionStateStore;
use chatter_search::rate_limit::{Provider, RateGovernor};
use chatter_search::vector::{LocalVectorStore, VectorStore};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn governor() -> Arc<RateGovernor> {
    let mut defaults = HashMap::new();
    defaults.insert(Provider::Chat, 1000);
    defaults.insert(Provider::Embedding, 1000);
    Arc::new(RateGovernor::new(defaults))
}

async fn stub_embeddings(server: &MockServer, dim: usize) {
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(move |req: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            let count = match &body["input"] {
                serde_json::Value::Array(items) => items.len(),
                _ => 1,
            };
            let data: Vec<_> = (0..count)
                .map(|i| json!({"embedding": vec![0.1f32; dim], "index": i}))
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({"data": data}))
        })
        .mount(server)
        .await;
}

async fn stub_channel_info(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/conversations.info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "channel": {"id": "C1", "name": "engineering", "is_member": true}
        })))
        .mount(server)
        .await;
}

fn history_response(messages: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "messages": messages,
        "response_metadata": {"next_cursor": ""}
    }))
}

#[tokio::test]
async fn initial_run_ingests_all_messages_and_advances_checkpoint() {
    let server = MockServer::start().await;
    stub_channel_info(&server).await;
    stub_embeddings(&server, 1536).await;

    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .respond_with(history_response(json!([
            {"ts": "1", "text": "first message", "user": "U1"},
            {"ts": "2", "text": "second message", "user": "U1"},
            {"ts": "3", "text": "third message", "user": "U2"}
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/reactions.get"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let gov = governor();
    let chat = Arc::new(ChatClient::new(
        ChatConfig {
            bot_token: "xoxb-test".to_string(),
            channels: vec!["C1".to_string()],
            base_url: server.uri(),
        },
        gov.clone(),
    ));
    let embedding = Arc::new(EmbeddingClient::new(
        EmbeddingConfig {
            api_key: "sk-test".to_string(),
            model: "text-embedding-3-small".to_string(),
            base_url: server.uri(),
            chunk_size: 8000,
            chunk_overlap: 200,
            batch_size: 64,
        },
        gov,
    ));

    let dir = tempfile::tempdir().unwrap();
    let vector_store: Arc<dyn VectorStore> =
        Arc::new(LocalVectorStore::load(dir.path().join("vectors.ndjson")).unwrap());
    let state = Arc::new(IngestionStateStore::load(dir.path().join("state.json")));

    let pipeline = IngestPipeline::new(chat, embedding, vector_store.clone(), state.clone());
    let report = pipeline.run_channel("C1").await;

    assert!(!report.failed);
    assert_eq!(report.messages_processed, 3);
    assert_eq!(report.messages_upserted, 3);
    assert_eq!(state.last_ingested_ts("C1"), Some("3".to_string()));

    let stats = vector_store.stats().await.unwrap();
    assert_eq!(stats.total_vectors, 3);
}

#[tokio::test]
async fn incremental_run_only_ingests_the_new_message() {
    let server = MockServer::start().await;
    stub_channel_info(&server).await;
    stub_embeddings(&server, 1536).await;

    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .respond_with(history_response(json!([
            {"ts": "5", "text": "a new message", "user": "U1"}
        ])))
        .mount(&server)
        .await;

    let gov = governor();
    let chat = Arc::new(ChatClient::new(
        ChatConfig {
            bot_token: "xoxb-test".to_string(),
            channels: vec!["C1".to_string()],
            base_url: server.uri(),
        },
        gov.clone(),
    ));
    let embedding = Arc::new(EmbeddingClient::new(
        EmbeddingConfig {
            api_key: "sk-test".to_string(),
            model: "text-embedding-3-small".to_string(),
            base_url: server.uri(),
            chunk_size: 8000,
            chunk_overlap: 200,
            batch_size: 64,
        },
        gov,
    ));

    let dir = tempfile::tempdir().unwrap();
    let vector_store: Arc<dyn VectorStore> =
        Arc::new(LocalVectorStore::load(dir.path().join("vectors.ndjson")).unwrap());
    let state = Arc::new(IngestionStateStore::load(dir.path().join("state.json")));
    state.advance("C1", "3", 3).unwrap();

    let pipeline = IngestPipeline::new(chat, embedding, vector_store.clone(), state.clone());
    let report = pipeline.run_channel("C1").await;

    assert!(!report.failed);
    assert_eq!(report.messages_processed, 1);
    assert_eq!(state.last_ingested_ts("C1"), Some("5".to_string()));

    let stats = vector_store.stats().await.unwrap();
    assert_eq!(stats.total_vectors, 1);
}

#[tokio::test]
async fn dimension_mismatch_aborts_the_batch_and_leaves_checkpoint_unchanged() {
    let server = MockServer::start().await;
    stub_channel_info(&server).await;
    stub_embeddings(&server, 768).await;

    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .respond_with(history_response(json!([
            {"ts": "1", "text": "a message that will fail to embed", "user": "U1"}
        ])))
        .mount(&server)
        .await;

    let gov = governor();
    let chat = Arc::new(ChatClient::new(
        ChatConfig {
            bot_token: "xoxb-test".to_string(),
            channels: vec!["C1".to_string()],
            base_url: server.uri(),
        },
        gov.clone(),
    ));
    let embedding = Arc::new(EmbeddingClient::new(
        EmbeddingConfig {
            api_key: "sk-test".to_string(),
            model: "text-embedding-3-small".to_string(),
            base_url: server.uri(),
            chunk_size: 8000,
            chunk_overlap: 200,
            batch_size: 64,
        },
        gov,
    ));

    let dir = tempfile::tempdir().unwrap();
    let vector_store: Arc<dyn VectorStore> =
        Arc::new(LocalVectorStore::load(dir.path().join("vectors.ndjson")).unwrap());
    let state = Arc::new(IngestionStateStore::load(dir.path().join("state.json")));

    let pipeline = IngestPipeline::new(chat, embedding, vector_store.clone(), state.clone());
    let report = pipeline.run_channel("C1").await;

    assert!(report.failed);
    assert_eq!(state.last_ingested_ts("C1"), None);

    let stats = vector_store.stats().await.unwrap();
    assert_eq!(stats.total_vectors, 0);
}
