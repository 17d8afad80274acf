//! Response cache with single-flight de-duplication
//!
//! Keyed by a sha256 fingerprint of the canonical request. At most one
//! generation is in flight per key: concurrent callers with the same
//! fingerprint share the leader's computation and observe byte-equal
//! responses. The in-flight registry is the only structure held across a
//! suspension point, and only through its watch channels.

use dashmap::DashMap;
use hive_core::ClockRef;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::watch;

use crate::types::{LlmRequest, LlmResponse};

/// Compute the cache fingerprint for a request resolved to a model.
pub fn fingerprint(req: &LlmRequest, qualified_model_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(req.canonical_text().as_bytes());
    hasher.update([0u8]);
    hasher.update(qualified_model_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(req.temperature.to_le_bytes());
    hasher.update(req.max_tokens.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(req.tools_signature().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: LlmResponse,
    cached_at_ms: u64,
}

/// Outcome of acquiring a fingerprint slot.
pub enum Acquire {
    /// Fresh cached response; `was_cached` is set, cost is zero, and the
    /// latency reflects the lookup only.
    Hit(LlmResponse),
    /// This caller is the leader and must run the generation, then call
    /// [`LeaderGuard::complete`].
    Leader(LeaderGuard),
}

/// Held by the single in-flight generator for a key. Dropping the guard
/// without completing wakes waiters so one of them can take over.
pub struct LeaderGuard {
    key: String,
    cache: ResponseCacheInner,
    tx: watch::Sender<bool>,
}

impl LeaderGuard {
    /// Publish the response and release the key.
    pub fn complete(self, response: &LlmResponse) {
        self.cache.entries.insert(
            self.key.clone(),
            CacheEntry {
                response: response.clone(),
                cached_at_ms: self.cache.clock.monotonic_ms(),
            },
        );
        let _ = self.tx.send(true);
        // Drop removes the in-flight registration.
    }

    /// Release the key without publishing (generation failed).
    pub fn abandon(self) {
        // Drop removes the registration; the dropped sender wakes
        // waiters, who re-contend for leadership.
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.cache.inflight.remove(&self.key);
    }
}

#[derive(Clone)]
struct ResponseCacheInner {
    entries: std::sync::Arc<DashMap<String, CacheEntry>>,
    inflight: std::sync::Arc<DashMap<String, watch::Receiver<bool>>>,
    ttl: Duration,
    clock: ClockRef,
}

/// Process-wide prompt/response cache.
#[derive(Clone)]
pub struct ResponseCache {
    inner: ResponseCacheInner,
}

impl ResponseCache {
    pub fn new(ttl: Duration, clock: ClockRef) -> Self {
        Self {
            inner: ResponseCacheInner {
                entries: std::sync::Arc::new(DashMap::new()),
                inflight: std::sync::Arc::new(DashMap::new()),
                ttl,
                clock,
            },
        }
    }

    /// Fresh cached response for the key, if present.
    pub fn get(&self, key: &str) -> Option<LlmResponse> {
        let lookup_started = self.inner.clock.monotonic_ms();
        let entry = self.inner.entries.get(key)?;
        let age_ms = self.inner.clock.monotonic_ms().saturating_sub(entry.cached_at_ms);
        if age_ms > self.inner.ttl.as_millis() as u64 {
            drop(entry);
            self.inner.entries.remove(key);
            return None;
        }
        let mut response = entry.response.clone();
        response.was_cached = true;
        response.cost_usd = 0.0;
        response.latency_ms =
            self.inner.clock.monotonic_ms().saturating_sub(lookup_started) as f64;
        Some(response)
    }

    /// Acquire the key: either a cached hit or leadership of the single
    /// in-flight generation. Followers wait here until the leader
    /// publishes or abandons.
    pub async fn acquire(&self, key: &str) -> Acquire {
        loop {
            if let Some(hit) = self.get(key) {
                return Acquire::Hit(hit);
            }

            let existing = self.inner.inflight.get(key).map(|r| r.clone());
            match existing {
                Some(mut rx) => {
                    // Follower: wait for the leader, then re-check. A
                    // closed channel means the leader failed; loop to
                    // contend for leadership.
                    let _ = rx.changed().await;
                }
                None => {
                    let (tx, rx) = watch::channel(false);
                    match self.inner.inflight.entry(key.to_string()) {
                        dashmap::mapref::entry::Entry::Occupied(_) => {
                            // Lost the race; retry as follower.
                            continue;
                        }
                        dashmap::mapref::entry::Entry::Vacant(slot) => {
                            slot.insert(rx);
                            return Acquire::Leader(LeaderGuard {
                                key: key.to_string(),
                                cache: self.inner.clone(),
                                tx,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Drop expired entries.
    pub fn prune(&self) {
        let now = self.inner.clock.monotonic_ms();
        let ttl_ms = self.inner.ttl.as_millis() as u64;
        self.inner
            .entries
            .retain(|_, entry| now.saturating_sub(entry.cached_at_ms) <= ttl_ms);
    }

    /// Number of live entries (expired ones included until pruned).
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FinishReason;
    use hive_core::{ManualClock, system_clock};
    use std::sync::Arc;

    fn response(content: &str) -> LlmResponse {
        LlmResponse {
            content: content.to_string(),
            model_used: "m".into(),
            provider: "p".into(),
            input_tokens: 10,
            output_tokens: 5,
            cost_usd: 0.001,
            latency_ms: 100.0,
            finish_reason: FinishReason::Stop,
            was_cached: false,
        }
    }

    #[test]
    fn test_fingerprint_sensitivity() {
        let req = LlmRequest::new("hello");
        let base = fingerprint(&req, "openai/gpt-4o-mini");

        assert_eq!(base, fingerprint(&LlmRequest::new("hello"), "openai/gpt-4o-mini"));
        assert_ne!(base, fingerprint(&req, "openai/gpt-4o"));
        assert_ne!(
            base,
            fingerprint(&LlmRequest::new("hello").with_temperature(0.2), "openai/gpt-4o-mini")
        );
        assert_ne!(
            base,
            fingerprint(&LlmRequest::new("hello").with_max_tokens(99), "openai/gpt-4o-mini")
        );
    }

    #[tokio::test]
    async fn test_hit_sets_cache_markers() {
        let cache = ResponseCache::new(Duration::from_secs(60), system_clock());
        match cache.acquire("k").await {
            Acquire::Leader(guard) => guard.complete(&response("cached")),
            Acquire::Hit(_) => panic!("empty cache cannot hit"),
        }

        let hit = cache.get("k").unwrap();
        assert!(hit.was_cached);
        assert_eq!(hit.cost_usd, 0.0);
        assert_eq!(hit.content, "cached");
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let clock = Arc::new(ManualClock::default());
        let cache = ResponseCache::new(Duration::from_secs(10), clock.clone());
        match cache.acquire("k").await {
            Acquire::Leader(guard) => guard.complete(&response("v")),
            Acquire::Hit(_) => unreachable!(),
        }

        clock.advance(Duration::from_secs(5));
        assert!(cache.get("k").is_some());
        clock.advance(Duration::from_secs(6));
        assert!(cache.get("k").is_none());
    }

    #[tokio::test]
    async fn test_single_flight_shares_one_computation() {
        let cache = ResponseCache::new(Duration::from_secs(60), system_clock());

        let leader = match cache.acquire("k").await {
            Acquire::Leader(guard) => guard,
            Acquire::Hit(_) => unreachable!(),
        };

        // A follower queued behind the leader.
        let cache2 = cache.clone();
        let follower = tokio::spawn(async move { cache2.acquire("k").await });

        tokio::task::yield_now().await;
        leader.complete(&response("shared"));

        match follower.await.unwrap() {
            Acquire::Hit(resp) => {
                assert_eq!(resp.content, "shared");
                assert!(resp.was_cached);
            }
            Acquire::Leader(_) => panic!("follower must observe the leader's response"),
        }
    }

    #[tokio::test]
    async fn test_abandon_promotes_a_follower() {
        let cache = ResponseCache::new(Duration::from_secs(60), system_clock());

        let leader = match cache.acquire("k").await {
            Acquire::Leader(guard) => guard,
            Acquire::Hit(_) => unreachable!(),
        };

        let cache2 = cache.clone();
        let follower = tokio::spawn(async move { cache2.acquire("k").await });
        tokio::task::yield_now().await;

        leader.abandon();
        match follower.await.unwrap() {
            Acquire::Leader(guard) => guard.abandon(),
            Acquire::Hit(_) => panic!("abandoned key has nothing cached"),
        }
    }
}
