// src/search/cache.rs
// In-memory TTL cache for full search responses, keyed by a SHA-256
// fingerprint of the enhanced query and its canonical filters. Backed by a
// plain in-process map instead of SQLite since this cache only needs to
// live for 5 minutes.

use super::SearchResponse;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const TTL: Duration = Duration::from_secs(5 * 60);

struct Entry {
    response: SearchResponse,
    inserted_at: Instant,
}

pub struct ResponseCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<SearchResponse> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < TTL => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, response: SearchResponse) {
        self.entries.lock().insert(
            key,
            Entry {
                response,
                inserted_at: Instant::now(),
            },
        );
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprints an enhanced query plus its canonical filters into a stable
/// cache key.
pub fn generate_key(
    enhanced_text: &str,
    top_k: u32,
    channel_id: Option<&str>,
    user_id: Option<&str>,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(enhanced_text.as_bytes());
    hasher.update(top_k.to_string().as_bytes());
    hasher.update(channel_id.unwrap_or("").as_bytes());
    hasher.update(user_id.unwrap_or("").as_bytes());
    hasher.update(date_from.unwrap_or("").as_bytes());
    hasher.update(date_to.unwrap_or("").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_produce_identical_keys() {
        let a = generate_key("deploy issues", 10, Some("C1"), None, None, None);
        let b = generate_key("deploy issues", 10, Some("C1"), None, None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn differing_top_k_produces_different_keys() {
        let a = generate_key("deploy issues", 10, None, None, None, None);
        let b = generate_key("deploy issues", 20, None, None, None, None);
        assert_ne!(a, b);
    }

    #[test]
    fn cache_expires_is_absent_before_insertion() {
        let cache = ResponseCache::new();
        assert!(cache.get("missing").is_none());
    }
}
