// src/error.rs
// Crate-wide error taxonomy

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;

/// The kind of failure, independent of its message. Used to decide retry
/// policy and to classify a run's errors without string-matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    AuthUpstream,
    AuthClient,
    UpstreamThrottled,
    UpstreamTimeout,
    UpstreamInvalid,
    NotIndexed,
    EmbeddingDimensionMismatch,
    PersistenceWriteFailed,
    HandlerPanic,
}

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream {provider} rejected credentials")]
    AuthUpstream { provider: String },

    #[error("authentication failed")]
    AuthClient,

    #[error("session invalid or expired")]
    SessionInvalid,

    #[error("upstream {provider} throttled the request")]
    UpstreamThrottled { provider: String },

    #[error("upstream {provider} timed out")]
    UpstreamTimeout { provider: String },

    #[error("upstream {provider} returned an invalid response: {detail}")]
    UpstreamInvalid { provider: String, detail: String },

    #[error("channel {0} is not indexed")]
    NotIndexed(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    #[error("failed to persist state: {0}")]
    PersistenceWriteFailed(String),

    #[error("invalid request: {0}")]
    InvalidParams(String),

    #[error("unknown method: {0}")]
    MethodNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Config(_) => ErrorKind::Config,
            ServiceError::AuthUpstream { .. } => ErrorKind::AuthUpstream,
            ServiceError::AuthClient => ErrorKind::AuthClient,
            ServiceError::SessionInvalid => ErrorKind::AuthClient,
            ServiceError::UpstreamThrottled { .. } => ErrorKind::UpstreamThrottled,
            ServiceError::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            ServiceError::UpstreamInvalid { .. } => ErrorKind::UpstreamInvalid,
            ServiceError::NotIndexed(_) => ErrorKind::NotIndexed,
            ServiceError::EmbeddingDimensionMismatch { .. } => ErrorKind::EmbeddingDimensionMismatch,
            ServiceError::PersistenceWriteFailed(_) => ErrorKind::PersistenceWriteFailed,
            ServiceError::InvalidParams(_) | ServiceError::MethodNotFound(_) => ErrorKind::HandlerPanic,
            ServiceError::Other(_) => ErrorKind::HandlerPanic,
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UpstreamThrottled | ErrorKind::UpstreamTimeout
        )
    }

    /// JSON-RPC error code per the wire protocol.
    pub fn rpc_code(&self) -> i32 {
        match self {
            ServiceError::InvalidParams(_) => -32602,
            ServiceError::MethodNotFound(_) => -32601,
            ServiceError::AuthClient => -32001,
            ServiceError::SessionInvalid => -32002,
            ServiceError::UpstreamThrottled { .. }
            | ServiceError::UpstreamTimeout { .. }
            | ServiceError::UpstreamInvalid { .. }
            | ServiceError::AuthUpstream { .. } => -32003,
            ServiceError::NotIndexed(_) => -32003,
            _ => -32603,
        }
    }

    pub fn rpc_data(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::UpstreamThrottled { provider } => {
                Some(json!({"provider": provider, "retryable": true}))
            }
            ServiceError::UpstreamTimeout { provider } => {
                Some(json!({"provider": provider, "retryable": true}))
            }
            ServiceError::UpstreamInvalid { provider, .. } => {
                Some(json!({"provider": provider, "retryable": false}))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::AuthClient => StatusCode::UNAUTHORIZED,
            ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::NotIndexed => StatusCode::OK,
            ErrorKind::UpstreamThrottled | ErrorKind::UpstreamTimeout => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(kind = ?self.kind(), "request failed: {}", self);

        (
            status,
            Json(json!({
                "jsonrpc": "2.0",
                "error": {
                    "code": self.rpc_code(),
                    "message": self.to_string(),
                    "data": self.rpc_data(),
                }
            })),
        )
            .into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
