//! Rate and spend admission control
//!
//! One token bucket plus one rolling spend window per (provider, model)
//! pair. A reservation holds the estimated cost between admission and
//! settlement so a burst of concurrent requests cannot overshoot the
//! budget; settling replaces the estimate with the actual charge, and a
//! dropped reservation releases it.

use hive_core::{ClockRef, HiveError, HiveResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Limiter configuration shared by every pair.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Bucket capacity in requests
    pub bucket_capacity: f64,
    /// Bucket refill in requests per second
    pub refill_per_sec: f64,
    /// Spend accounting window
    pub spend_window: Duration,
    /// Budget in USD per window
    pub max_spend_usd: f64,
}

impl LimiterConfig {
    /// Derive a config from a requests-per-minute setting with an
    /// effectively unlimited budget.
    pub fn from_requests_per_minute(rpm: u32) -> Self {
        Self {
            bucket_capacity: rpm as f64,
            refill_per_sec: rpm as f64 / 60.0,
            spend_window: Duration::from_secs(3600),
            max_spend_usd: f64::MAX,
        }
    }

    pub fn with_budget(mut self, max_spend_usd: f64, window: Duration) -> Self {
        self.max_spend_usd = max_spend_usd;
        self.spend_window = window;
        self
    }
}

#[derive(Debug)]
struct PairState {
    tokens: f64,
    last_refill_ms: u64,
    /// (settled_at_ms, cost) pairs inside the window
    spends: VecDeque<(u64, f64)>,
    /// Sum of estimates held by outstanding reservations
    reserved_usd: f64,
}

struct LimiterShared {
    pairs: Mutex<HashMap<String, PairState>>,
    config: LimiterConfig,
    clock: ClockRef,
}

/// Admission token for one provider call. Settle it with the actual
/// cost after the call; dropping it unsettled releases the estimate.
pub struct Reservation {
    shared: Arc<LimiterShared>,
    key: String,
    estimate_usd: f64,
    settled: bool,
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("key", &self.key)
            .field("estimate_usd", &self.estimate_usd)
            .field("settled", &self.settled)
            .finish()
    }
}

impl Reservation {
    /// Replace the reserved estimate with the actual charge.
    pub fn settle(mut self, actual_cost_usd: f64) {
        self.settled = true;
        let now = self.shared.clock.monotonic_ms();
        let mut pairs = self.shared.pairs.lock();
        if let Some(state) = pairs.get_mut(&self.key) {
            state.reserved_usd = (state.reserved_usd - self.estimate_usd).max(0.0);
            if actual_cost_usd > 0.0 {
                state.spends.push_back((now, actual_cost_usd));
            }
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut pairs = self.shared.pairs.lock();
        if let Some(state) = pairs.get_mut(&self.key) {
            state.reserved_usd = (state.reserved_usd - self.estimate_usd).max(0.0);
        }
    }
}

/// Token-bucket rate limiter with a rolling spend budget.
#[derive(Clone)]
pub struct RateSpendLimiter {
    shared: Arc<LimiterShared>,
}

impl RateSpendLimiter {
    pub fn new(config: LimiterConfig, clock: ClockRef) -> Self {
        Self {
            shared: Arc::new(LimiterShared {
                pairs: Mutex::new(HashMap::new()),
                config,
                clock,
            }),
        }
    }

    /// Admit a request against the (provider, model) pair. Returns a
    /// reservation holding `estimated_cost_usd`, or RateLimit with a
    /// retry hint.
    pub fn admit(
        &self,
        provider: &str,
        model_id: &str,
        estimated_cost_usd: f64,
    ) -> HiveResult<Reservation> {
        let key = format!("{}/{}", provider, model_id);
        let now = self.shared.clock.monotonic_ms();
        let config = &self.shared.config;
        let mut pairs = self.shared.pairs.lock();
        let state = pairs.entry(key.clone()).or_insert_with(|| PairState {
            tokens: config.bucket_capacity,
            last_refill_ms: now,
            spends: VecDeque::new(),
            reserved_usd: 0.0,
        });

        // Refill.
        let elapsed_ms = now.saturating_sub(state.last_refill_ms);
        state.tokens = (state.tokens + elapsed_ms as f64 / 1000.0 * config.refill_per_sec)
            .min(config.bucket_capacity);
        state.last_refill_ms = now;

        // Rate check.
        if state.tokens < 1.0 {
            let deficit = 1.0 - state.tokens;
            let retry_after_ms = (deficit / config.refill_per_sec * 1000.0).ceil() as u64;
            tracing::debug!(pair = %key, retry_after_ms, "rate admission denied");
            return Err(HiveError::rate_limit(
                format!("rate limit exceeded for {}", key),
                retry_after_ms.max(1),
            ));
        }

        // Spend check over the rolling window.
        let window_ms = config.spend_window.as_millis() as u64;
        while let Some(&(at, _)) = state.spends.front() {
            if now.saturating_sub(at) > window_ms {
                state.spends.pop_front();
            } else {
                break;
            }
        }
        let settled: f64 = state.spends.iter().map(|&(_, cost)| cost).sum();
        if settled + state.reserved_usd + estimated_cost_usd > config.max_spend_usd {
            let retry_after_ms = state
                .spends
                .front()
                .map(|&(at, _)| window_ms.saturating_sub(now.saturating_sub(at)))
                .unwrap_or(window_ms)
                .max(1);
            tracing::debug!(pair = %key, retry_after_ms, "spend admission denied");
            return Err(HiveError::rate_limit(
                format!("spend budget exceeded for {}", key),
                retry_after_ms,
            ));
        }

        state.tokens -= 1.0;
        state.reserved_usd += estimated_cost_usd;
        Ok(Reservation {
            shared: self.shared.clone(),
            key,
            estimate_usd: estimated_cost_usd,
            settled: false,
        })
    }

    /// Settled spend currently inside the window for a pair.
    pub fn window_spend(&self, provider: &str, model_id: &str) -> f64 {
        let key = format!("{}/{}", provider, model_id);
        let now = self.shared.clock.monotonic_ms();
        let window_ms = self.shared.config.spend_window.as_millis() as u64;
        let pairs = self.shared.pairs.lock();
        pairs
            .get(&key)
            .map(|state| {
                state
                    .spends
                    .iter()
                    .filter(|&&(at, _)| now.saturating_sub(at) <= window_ms)
                    .map(|&(_, cost)| cost)
                    .sum()
            })
            .unwrap_or(0.0)
    }
}
