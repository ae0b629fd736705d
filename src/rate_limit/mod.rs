// src/rate_limit/mod.rs
// Per-(provider, endpoint) sliding-window admission with retry-after honoring.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter as GovRateLimiter};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Chat,
    Embedding,
    Enhancer,
    RequestServer,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Chat => "chat",
            Provider::Embedding => "embedding",
            Provider::Enhancer => "enhancer",
            Provider::RequestServer => "request_server",
        }
    }
}

type Key = (Provider, String);

struct Bucket {
    limiter: GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    jitter: Jitter,
}

impl Bucket {
    fn new(per_minute: u32) -> anyhow::Result<Self> {
        let quota = Quota::per_minute(
            NonZeroU32::new(per_minute).ok_or_else(|| anyhow::anyhow!("invalid rate limit"))?,
        );
        Ok(Self {
            limiter: GovRateLimiter::direct(quota),
            jitter: Jitter::new(Duration::from_millis(10), Duration::from_millis(100)),
        })
    }
}

/// Governs admission to upstream providers. One sliding-window bucket per
/// `(provider, endpoint)` key, plus an independent cooldown deadline that a
/// server-issued retry-after hint can push into the future.
pub struct RateGovernor {
    buckets: RwLock<HashMap<Key, Arc<Bucket>>>,
    cooldowns: RwLock<HashMap<Key, Instant>>,
    default_per_minute: HashMap<Provider, u32>,
}

impl RateGovernor {
    pub fn new(default_per_minute: HashMap<Provider, u32>) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            cooldowns: RwLock::new(HashMap::new()),
            default_per_minute,
        }
    }

    fn bucket_for(&self, key: &Key) -> anyhow::Result<Arc<Bucket>> {
        if let Some(b) = self.buckets.read().get(key) {
            return Ok(b.clone());
        }

        let per_minute = *self
            .default_per_minute
            .get(&key.0)
            .unwrap_or(&60);

        let bucket = Arc::new(Bucket::new(per_minute)?);
        self.buckets.write().insert(key.clone(), bucket.clone());
        Ok(bucket)
    }

    /// Blocks until the key is admitted: past any active cooldown and within
    /// the sliding window. FIFO per key because the cooldown check and the
    /// bucket wait are both first-come-first-served.
    pub async fn acquire(&self, provider: Provider, endpoint: &str) -> anyhow::Result<()> {
        let key: Key = (provider, endpoint.to_string());

        loop {
            let cooldown = self.cooldowns.read().get(&key).copied();
            if let Some(until) = cooldown {
                let now = Instant::now();
                if now < until {
                    tokio::time::sleep(until - now).await;
                    continue;
                }
            }
            break;
        }

        let bucket = self.bucket_for(&key)?;
        bucket.limiter.until_ready_with_jitter(bucket.jitter).await;
        Ok(())
    }

    pub fn try_acquire(&self, provider: Provider, endpoint: &str) -> anyhow::Result<bool> {
        let key: Key = (provider, endpoint.to_string());
        if let Some(until) = self.cooldowns.read().get(&key) {
            if Instant::now() < *until {
                return Ok(false);
            }
        }
        let bucket = self.bucket_for(&key)?;
        Ok(bucket.limiter.check().is_ok())
    }

    /// Records an upstream-issued retry-after hint. Subsequent acquisitions
    /// for this key wait at least until now + duration, extending (never
    /// shortening) any existing cooldown.
    pub fn notify_retry_after(&self, provider: Provider, endpoint: &str, duration: Duration) {
        let key: Key = (provider, endpoint.to_string());
        let new_deadline = Instant::now() + duration;

        let mut cooldowns = self.cooldowns.write();
        let entry = cooldowns.entry(key).or_insert(new_deadline);
        if new_deadline > *entry {
            *entry = new_deadline;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acquires_immediately_under_limit() {
        let mut defaults = HashMap::new();
        defaults.insert(Provider::Chat, 1000);
        let gov = RateGovernor::new(defaults);

        let start = Instant::now();
        gov.acquire(Provider::Chat, "conversations.history")
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn cooldown_only_extends_forward() {
        let mut defaults = HashMap::new();
        defaults.insert(Provider::Chat, 60);
        let gov = RateGovernor::new(defaults);

        gov.notify_retry_after(Provider::Chat, "conversations.history", Duration::from_secs(5));
        let first = *gov
            .cooldowns
            .read()
            .get(&(Provider::Chat, "conversations.history".to_string()))
            .unwrap();

        gov.notify_retry_after(Provider::Chat, "conversations.history", Duration::from_millis(1));
        let second = *gov
            .cooldowns
            .read()
            .get(&(Provider::Chat, "conversations.history".to_string()))
            .unwrap();

        assert!(second >= first, "a shorter hint must not shrink the cooldown");
    }

    #[test]
    fn distinct_endpoints_get_independent_buckets() {
        let mut defaults = HashMap::new();
        defaults.insert(Provider::Chat, 10);
        let gov = RateGovernor::new(defaults);

        assert!(gov.try_acquire(Provider::Chat, "a").unwrap());
        assert!(gov.try_acquire(Provider::Chat, "b").unwrap());
    }
}
