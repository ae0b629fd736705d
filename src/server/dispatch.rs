// src/server/dispatch.rs
// JSON-RPC 2.0 method dispatch: initialize, tools/list, tools/call.

use crate::error::{ServiceError, ServiceResult};
use crate::models::Session;
use crate::tools::Registry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcSuccess {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcFailure {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub error: JsonRpcErrorBody,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcErrorBody {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub fn success(id: Value, result: Value) -> JsonRpcSuccess {
    JsonRpcSuccess {
        jsonrpc: "2.0",
        id,
        result,
    }
}

pub fn failure(id: Value, error: ServiceError) -> JsonRpcFailure {
    JsonRpcFailure {
        jsonrpc: "2.0",
        id,
        error: JsonRpcErrorBody {
            code: error.rpc_code(),
            message: error.to_string(),
            data: error.rpc_data(),
        },
    }
}

pub async fn handle_initialize(subject: &str, sessions: &super::session::SessionStore) -> Value {
    let session: Session = sessions.create(subject);
    json!({
        "session_id": session.session_id,
        "capabilities": {"tools": true},
        "server_info": {"name": "chatter-search", "version": env!("CARGO_PKG_VERSION")}
    })
}

pub async fn handle_tools_list(registry: &Registry) -> Value {
    json!({ "tools": registry.list() })
}

pub async fn handle_tools_call(registry: &Registry, params: &Value) -> ServiceResult<Value> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidParams("params.name is required".to_string()))?;

    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
    registry.call(name, &arguments).await
}
