// src/config/mod.rs
// Central configuration, composed from per-component env-sourced structs.

pub mod helpers;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::time::Duration;

lazy_static! {
    pub static ref CONFIG: AppConfig = AppConfig::from_env();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub bot_token: String,
    pub channels: Vec<String>,
    pub base_url: String,
}

impl ChatConfig {
    pub fn from_env() -> Self {
        let channels = helpers::require_env("CHAT_CHANNELS")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            bot_token: helpers::require_env("CHAT_BOT_TOKEN"),
            channels,
            base_url: helpers::env_or("CHAT_BASE_URL", "https://slack.com/api"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: helpers::require_env("EMBED_API_KEY"),
            model: helpers::env_or("EMBED_MODEL", "text-embedding-3-small"),
            base_url: helpers::env_or("EMBED_BASE_URL", "https://api.openai.com/v1"),
            chunk_size: helpers::env_parsed_or("CHUNK_SIZE", 8000),
            chunk_overlap: helpers::env_parsed_or("CHUNK_OVERLAP", 200),
            batch_size: helpers::env_parsed_or("EMBED_BATCH_SIZE", 64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancerConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl EnhancerConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: helpers::env_or("ENHANCER_API_KEY", &helpers::env_or("EMBED_API_KEY", "")),
            model: helpers::env_or("ENHANCER_MODEL", "gpt-4o-mini"),
            base_url: helpers::env_or("ENHANCER_BASE_URL", "https://api.openai.com/v1"),
            system_prompt: helpers::env_or(
                "ENHANCER_SYSTEM_PROMPT",
                include_str!("../enhancer/prompt.txt"),
            ),
            temperature: helpers::env_parsed_or("ENHANCER_TEMPERATURE", 0.1),
            max_tokens: helpers::env_parsed_or("ENHANCER_MAX_TOKENS", 512),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    pub api_key: Option<String>,
    pub url: String,
    pub index_name: String,
    pub local_path: String,
}

impl VectorConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: helpers::env_opt("VECTOR_API_KEY"),
            url: helpers::env_or("VECTOR_URL", "http://localhost:6334"),
            index_name: helpers::env_or("VECTOR_INDEX_NAME", "messages"),
            local_path: helpers::env_or("LOCAL_VECTOR_PATH", "./data/vectors.ndjson"),
        }
    }

    pub fn use_remote(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub whitelist_keys: Vec<String>,
    pub session_ttl_hours: i64,
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let whitelist_keys = helpers::require_env("WHITELIST_KEYS")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            listen_addr: helpers::env_or("LISTEN_ADDR", "0.0.0.0:5000"),
            whitelist_keys,
            session_ttl_hours: helpers::env_parsed_or("SESSION_TTL_HOURS", 24),
            max_body_bytes: helpers::env_parsed_or("MAX_BODY_BYTES", 1024 * 1024),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub chat_per_minute: u32,
    pub embedding_per_minute: u32,
    pub enhancer_per_minute: u32,
    pub request_server_per_minute: u32,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            chat_per_minute: helpers::env_parsed_or("CHAT_RATE_LIMIT_PER_MINUTE", 50),
            embedding_per_minute: helpers::env_parsed_or("EMBED_RATE_LIMIT_PER_MINUTE", 500),
            enhancer_per_minute: helpers::env_parsed_or("ENHANCER_RATE_LIMIT_PER_MINUTE", 60),
            request_server_per_minute: helpers::env_parsed_or("SESSION_RATE_LIMIT_PER_MINUTE", 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub refresh_interval_hours: u64,
    pub max_concurrent_channels: usize,
    pub ingestion_state_path: String,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            refresh_interval_hours: helpers::env_parsed_or("REFRESH_INTERVAL_HOURS", 1),
            max_concurrent_channels: helpers::env_parsed_or("MAX_CONCURRENT_CHANNELS", 3),
            ingestion_state_path: helpers::env_or(
                "INGESTION_STATE_PATH",
                "./data/ingestion_state.json",
            ),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_hours * 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            filter: helpers::env_or("RUST_LOG", "info"),
        }
    }
}

/// Top-level configuration tree, composed from the domain configs above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub embedding: EmbeddingConfig,
    pub enhancer: EnhancerConfig,
    pub vector: VectorConfig,
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            chat: ChatConfig::from_env(),
            embedding: EmbeddingConfig::from_env(),
            enhancer: EnhancerConfig::from_env(),
            vector: VectorConfig::from_env(),
            server: ServerConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            logging: LoggingConfig::from_env(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chat.channels.is_empty() {
            anyhow::bail!("CHAT_CHANNELS must list at least one channel");
        }
        if self.server.whitelist_keys.is_empty() {
            anyhow::bail!("WHITELIST_KEYS must list at least one bearer token");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
