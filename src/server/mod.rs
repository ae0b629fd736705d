// src/server/mod.rs
// Request server: a single JSON-RPC 2.0 endpoint over HTTPS POST, built on
// axum with tower_http layers for body-size limiting, tracing, and CORS.

pub mod dispatch;
pub mod session;

use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::rate_limit::{Provider, RateGovernor};
use crate::tools::Registry;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dispatch::{failure, handle_initialize, handle_tools_call, handle_tools_list, success, JsonRpcRequest};
use serde_json::{json, Value};
use session::SessionStore;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

const MCP_KEY_PREFIX: &str = "mcp_key_";
const MCP_KEY_SUFFIX_LEN: usize = 48;

pub struct AppState {
    pub registry: Registry,
    pub sessions: SessionStore,
    pub governor: Arc<RateGovernor>,
    pub whitelist_keys: Vec<String>,
}

pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .route("/rpc", post(rpc))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Validates `mcp_key_<48 hex chars>` shape, then compares against the
/// whitelist in constant time so an invalid token's wall-clock cost does
/// not leak which prefix bytes matched.
fn authenticate(headers: &HeaderMap, whitelist: &[String]) -> bool {
    let Some(token) = bearer_token(headers) else {
        return false;
    };

    if !token.starts_with(MCP_KEY_PREFIX) {
        return false;
    }
    if token.len() != MCP_KEY_PREFIX.len() + MCP_KEY_SUFFIX_LEN {
        return false;
    }

    whitelist.iter().any(|candidate| constant_time_eq(token.as_bytes(), candidate.as_bytes()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

async fn rpc(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::OK,
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": Value::Null,
                    "error": {"code": -32600, "message": format!("malformed request: {e}")}
                })),
            )
                .into_response();
        }
    };

    let id = request.id.clone();
    crate::metrics::record_rpc_request(&request.method);

    if request.method == "initialize" {
        if !authenticate(&headers, &state.whitelist_keys) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let token = bearer_token(&headers).unwrap_or("").to_string();
        let result = handle_initialize(&token, &state.sessions).await;
        return (StatusCode::OK, Json(success(id, result))).into_response();
    }

    if !authenticate(&headers, &state.whitelist_keys) {
        crate::metrics::record_rpc_error(ServiceError::AuthClient.rpc_code());
        return (StatusCode::OK, Json(failure(id, ServiceError::AuthClient))).into_response();
    }

    let session_id = headers
        .get("Mcp-Session-Id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let session = match state.sessions.get(session_id) {
        Some(s) => s,
        None => {
            crate::metrics::record_rpc_error(ServiceError::SessionInvalid.rpc_code());
            return (StatusCode::OK, Json(failure(id, ServiceError::SessionInvalid))).into_response();
        }
    };

    let wait_start = Instant::now();
    if let Err(e) = state.governor.acquire(Provider::RequestServer, &session.session_id).await {
        warn!("rate governor error for session {}: {}", session.session_id, e);
    }
    crate::metrics::record_rate_governor_wait(Provider::RequestServer.as_str(), wait_start.elapsed().as_secs_f64());

    let outcome = match request.method.as_str() {
        "tools/list" => Ok(handle_tools_list(&state.registry).await),
        "tools/call" => handle_tools_call(&state.registry, &request.params).await,
        other => Err(ServiceError::MethodNotFound(other.to_string())),
    };

    match outcome {
        Ok(result) => (StatusCode::OK, Json(success(id, result))).into_response(),
        Err(e) => {
            crate::metrics::record_rpc_error(e.rpc_code());
            (StatusCode::OK, Json(failure(id, e))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_slices() {
        assert!(constant_time_eq(b"mcp_key_abc", b"mcp_key_abc"));
    }

    #[test]
    fn constant_time_eq_rejects_differing_lengths() {
        assert!(!constant_time_eq(b"short", b"muchlonger"));
    }

    #[test]
    fn constant_time_eq_rejects_differing_content() {
        assert!(!constant_time_eq(b"mcp_key_abc", b"mcp_key_xyz"));
    }

    #[test]
    fn authenticate_rejects_wrong_prefix() {
        let headers = {
            let mut h = HeaderMap::new();
            h.insert(axum::http::header::AUTHORIZATION, "Bearer wrong_prefix_token".parse().unwrap());
            h
        };
        assert!(!authenticate(&headers, &["mcp_key_".to_string() + &"a".repeat(48)]));
    }
}
