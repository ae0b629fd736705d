// tests/server_rpc_test.rs
// Exercises the JSON-RPC endpoint end to end over a real TCP listener:
// auth enforcement, session handling, and method dispatch.

use chatter_search::chat::ChatClient;
use chatter_search::config::{ChatConfig, EmbeddingConfig, EnhancerConfig, ServerConfig};
use chatter_search::embedding::EmbeddingClient;
use chatter_search::enhancer::QueryEnhancer;
use chatter_search::ingest::state::IngestionStateStore;
use chatter_search::rate_limit::{Provider, RateGovernor};
use chatter_search::search::SearchService;
use chatter_search::server::session::SessionStore;
use chatter_search::server::{build_router, AppState};
use chatter_search::tools::Registry;
use chatter_search::vector::{LocalVectorStore, VectorStore};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

const TEST_TOKEN: &str = "mcp_key_000000000000000000000000000000000000000000000000";

async fn spawn_server() -> String {
    let mut defaults = HashMap::new();
    defaults.insert(Provider::Chat, 1000);
    defaults.insert(Provider::Embedding, 1000);
    defaults.insert(Provider::Enhancer, 1000);
    defaults.insert(Provider::RequestServer, 1000);
    let governor = Arc::new(RateGovernor::new(defaults));

    let chat = Arc::new(ChatClient::new(
        ChatConfig {
            bot_token: "xoxb-test".to_string(),
            channels: vec![],
            base_url: "http://127.0.0.1:1".to_string(),
        },
        governor.clone(),
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
        governor.clone(),
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
        governor.clone(),
    ));

    let dir = tempfile::tempdir().unwrap();
    let vector_store: Arc<dyn VectorStore> =
        Arc::new(LocalVectorStore::load(dir.path().join("vectors.ndjson")).unwrap());
    let search = Arc::new(SearchService::new(chat.clone(), embedding, enhancer, vector_store.clone()));
    let ingestion_state = Arc::new(IngestionStateStore::load(dir.path().join("state.json")));
    let registry = Registry::new(chat, search, vector_store, ingestion_state, vec![]);

    let server_config = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        whitelist_keys: vec![TEST_TOKEN.to_string()],
        session_ttl_hours: 24,
        max_body_bytes: 1024 * 1024,
    };

    let state = Arc::new(AppState {
        registry,
        sessions: SessionStore::new(server_config.session_ttl_hours),
        governor,
        whitelist_keys: server_config.whitelist_keys.clone(),
    });

    let router = build_router(state, &server_config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{addr}/rpc")
}

#[tokio::test]
async fn initialize_without_auth_is_rejected_at_transport_level() {
    let url = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&url)
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn initialize_then_tools_list_round_trips() {
    let url = spawn_server().await;
    let client = reqwest::Client::new();

    let init = client
        .post(&url)
        .bearer_auth(TEST_TOKEN)
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
        .send()
        .await
        .unwrap();
    assert_eq!(init.status(), 200);
    let init_body: serde_json::Value = init.json().await.unwrap();
    let session_id = init_body["result"]["session_id"].as_str().unwrap().to_string();
    assert!(!session_id.is_empty());

    let list = client
        .post(&url)
        .bearer_auth(TEST_TOKEN)
        .header("Mcp-Session-Id", &session_id)
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .send()
        .await
        .unwrap();
    assert_eq!(list.status(), 200);
    let list_body: serde_json::Value = list.json().await.unwrap();
    let tools = list_body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 3);
}

#[tokio::test]
async fn request_without_session_header_returns_session_invalid() {
    let url = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&url)
        .bearer_auth(TEST_TOKEN)
        .json(&json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32002);
}

#[tokio::test]
async fn unknown_tool_name_returns_method_not_found_over_the_wire() {
    let url = spawn_server().await;
    let client = reqwest::Client::new();

    let init = client
        .post(&url)
        .bearer_auth(TEST_TOKEN)
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
        .send()
        .await
        .unwrap();
    let init_body: serde_json::Value = init.json().await.unwrap();
    let session_id = init_body["result"]["session_id"].as_str().unwrap().to_string();

    let call = client
        .post(&url)
        .bearer_auth(TEST_TOKEN)
        .header("Mcp-Session-Id", &session_id)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": {"name": "delete_everything", "arguments": {}}
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(call.status(), 200);
    let body: serde_json::Value = call.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32601);
}
