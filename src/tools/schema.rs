// src/tools/schema.rs
// Input validation for tool calls, enforced before a handler runs.

use crate::error::ServiceError;
use serde_json::Value;
use std::sync::LazyLock;

static DATE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static date regex is valid"));

const MAX_QUERY_LEN: usize = 1000;

#[derive(Debug, Clone)]
pub struct SearchMessagesInput {
    pub query: String,
    pub top_k: Option<u32>,
    pub channel_filter: Option<String>,
    pub user_filter: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

pub fn parse_search_messages(params: &Value) -> Result<SearchMessagesInput, ServiceError> {
    let query = params
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::InvalidParams("query is required".to_string()))?;

    if query.is_empty() {
        return Err(ServiceError::InvalidParams("query must not be empty".to_string()));
    }
    if query.chars().count() > MAX_QUERY_LEN {
        return Err(ServiceError::InvalidParams(format!(
            "query exceeds {MAX_QUERY_LEN} characters"
        )));
    }

    // Accepted as any integer here; `search::Service` clamps it into [1, 50]
    // before use.
    let top_k = match params.get("top_k") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let n = v
                .as_u64()
                .ok_or_else(|| ServiceError::InvalidParams("top_k must be an integer".to_string()))?;
            Some(n as u32)
        }
    };

    let date_from = optional_date(params, "date_from")?;
    let date_to = optional_date(params, "date_to")?;

    Ok(SearchMessagesInput {
        query: query.to_string(),
        top_k,
        channel_filter: optional_string(params, "channel_filter"),
        user_filter: optional_string(params, "user_filter"),
        date_from,
        date_to,
    })
}

fn optional_string(params: &Value, field: &str) -> Option<String> {
    params.get(field).and_then(Value::as_str).map(str::to_string)
}

fn optional_date(params: &Value, field: &str) -> Result<Option<String>, ServiceError> {
    let Some(raw) = params.get(field).and_then(Value::as_str) else {
        return Ok(None);
    };
    if !DATE_RE.is_match(raw) {
        return Err(ServiceError::InvalidParams(format!("{field} must match YYYY-MM-DD")));
    }
    Ok(Some(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_missing_query() {
        let err = parse_search_messages(&json!({})).unwrap_err();
        assert_eq!(err.rpc_code(), -32602);
    }

    #[test]
    fn rejects_oversized_query() {
        let huge = "a".repeat(MAX_QUERY_LEN + 1);
        let err = parse_search_messages(&json!({"query": huge})).unwrap_err();
        assert_eq!(err.rpc_code(), -32602);
    }

    #[test]
    fn accepts_top_k_out_of_range_for_later_clamping() {
        let parsed = parse_search_messages(&json!({"query": "x", "top_k": 500})).unwrap();
        assert_eq!(parsed.top_k, Some(500));
    }

    #[test]
    fn rejects_non_integer_top_k() {
        let err = parse_search_messages(&json!({"query": "x", "top_k": "five"})).unwrap_err();
        assert_eq!(err.rpc_code(), -32602);
    }

    #[test]
    fn rejects_malformed_date() {
        let err = parse_search_messages(&json!({"query": "x", "date_from": "03/15/2024"})).unwrap_err();
        assert_eq!(err.rpc_code(), -32602);
    }

    #[test]
    fn accepts_minimal_valid_input() {
        let parsed = parse_search_messages(&json!({"query": "deploy failures"})).unwrap();
        assert_eq!(parsed.query, "deploy failures");
        assert!(parsed.top_k.is_none());
    }

    #[test]
    fn accepts_full_valid_input() {
        let parsed = parse_search_messages(&json!({
            "query": "deploy failures",
            "top_k": 5,
            "channel_filter": "engineering",
            "date_from": "2024-03-01",
            "date_to": "2024-03-31"
        }))
        .unwrap();
        assert_eq!(parsed.top_k, Some(5));
        assert_eq!(parsed.date_from.as_deref(), Some("2024-03-01"));
    }
}
