// src/enhancer/mod.rs
// LLM-driven query expansion: turns a raw natural-language query into an
// enhanced search string plus structured filters.

use crate::config::EnhancerConfig;
use crate::error::ServiceError;
use crate::rate_limit::{Provider, RateGovernor};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Problem,
    Info,
    Decision,
    Urgent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhancedQuery {
    pub enhanced_text: String,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default)]
    pub channel_filter: Option<String>,
    #[serde(default)]
    pub user_filter: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default = "default_intent")]
    pub intent: Intent,
    #[serde(default)]
    pub reasoning: String,
}

fn default_top_k() -> u32 {
    10
}

fn default_intent() -> Intent {
    Intent::Info
}

impl EnhancedQuery {
    fn fallback(raw_query: &str) -> Self {
        Self {
            enhanced_text: raw_query.to_string(),
            top_k: 10,
            channel_filter: None,
            user_filter: None,
            date_from: None,
            date_to: None,
            intent: Intent::Info,
            reasoning: "fallback: enhancer response was not valid JSON".to_string(),
        }
    }
}

pub struct QueryEnhancer {
    http: Client,
    config: EnhancerConfig,
    governor: Arc<RateGovernor>,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl QueryEnhancer {
    pub fn new(config: EnhancerConfig, governor: Arc<RateGovernor>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("failed to build enhancer http client"),
            config,
            governor,
        }
    }

    /// Expands `raw_query`. Never propagates a parse failure: an
    /// unparseable or unreachable enhancer degrades to the identity
    /// transform with `top_k = 10`.
    pub async fn enhance(&self, raw_query: &str) -> EnhancedQuery {
        match self.call(raw_query).await {
            Ok(Some(enhanced)) => enhanced,
            Ok(None) => {
                warn!("enhancer returned non-JSON response, falling back to raw query");
                EnhancedQuery::fallback(raw_query)
            }
            Err(e) => {
                warn!("enhancer call failed ({}), falling back to raw query", e);
                EnhancedQuery::fallback(raw_query)
            }
        }
    }

    async fn call(&self, raw_query: &str) -> Result<Option<EnhancedQuery>, ServiceError> {
        self.governor
            .acquire(Provider::Enhancer, "chat.completions")
            .await
            .map_err(ServiceError::Other)?;

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.config.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: raw_query.to_string(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };

        debug!("enhancing query: {} chars", raw_query.len());

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::UpstreamTimeout {
                        provider: "enhancer".to_string(),
                    }
                } else {
                    ServiceError::UpstreamInvalid {
                        provider: "enhancer".to_string(),
                        detail: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::UpstreamInvalid {
                provider: "enhancer".to_string(),
                detail: format!("status {}", response.status()),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| ServiceError::UpstreamInvalid {
            provider: "enhancer".to_string(),
            detail: e.to_string(),
        })?;

        let Some(content) = parsed.choices.into_iter().next().map(|c| c.message.content) else {
            return Ok(None);
        };

        Ok(serde_json::from_str::<EnhancedQuery>(&content).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_uses_raw_query_and_default_top_k() {
        let fallback = EnhancedQuery::fallback("deploy issues");
        assert_eq!(fallback.enhanced_text, "deploy issues");
        assert_eq!(fallback.top_k, 10);
        assert_eq!(fallback.intent, Intent::Info);
    }

    #[test]
    fn parses_minimal_json_with_defaults() {
        let json = r#"{"enhanced_text": "deploy failures in engineering"}"#;
        let parsed: EnhancedQuery = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.top_k, 10);
        assert_eq!(parsed.intent, Intent::Info);
        assert!(parsed.channel_filter.is_none());
    }

    #[test]
    fn parses_full_json() {
        let json = r#"{
            "enhanced_text": "deployment failures",
            "top_k": 5,
            "channel_filter": "engineering",
            "date_from": "2024-03-01",
            "date_to": "2024-03-31",
            "intent": "problem",
            "reasoning": "user asked about recent deploy issues"
        }"#;
        let parsed: EnhancedQuery = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.top_k, 5);
        assert_eq!(parsed.channel_filter.as_deref(), Some("engineering"));
        assert_eq!(parsed.intent, Intent::Problem);
    }
}
