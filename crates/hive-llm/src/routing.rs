//! Model routing: policy-weighted selection over the registry
//!
//! `recommend_model` is a pure function over the registry, the recent
//! performance history, and the policy; it performs no I/O and never
//! mutates state, so routing decisions are reproducible.

use dashmap::DashMap;
use hive_core::{HiveError, HiveResult, ModelCapability, ModelDescriptor, ModelRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tie-break margin granted to the preferred provider. Large enough to
/// decide exact ties, far too small to override a real score difference.
const PREFER_PROVIDER_BONUS: f64 = 1e-9;

/// What the request needs from a model.
#[derive(Debug, Clone, Default)]
pub struct ModelRequirements {
    /// Capabilities the model must declare
    pub capabilities: Vec<ModelCapability>,
    /// Estimated prompt size in tokens
    pub estimated_prompt_tokens: u32,
    /// Requested output cap in tokens
    pub max_tokens: u32,
}

/// Routing policy: scoring weights plus hard caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Weight on estimated cost
    pub w_cost: f64,
    /// Weight on observed latency
    pub w_latency: f64,
    /// Weight on quality score
    pub w_quality: f64,

    /// Drop models whose estimated request cost exceeds this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost_per_request: Option<f64>,

    /// Drop models whose observed mean latency exceeds this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<f64>,

    /// Break exact ties in favor of this provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefer_provider: Option<String>,

    /// Models to try, in order, after a retriable failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_models: Vec<String>,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            w_cost: 0.3,
            w_latency: 0.3,
            w_quality: 0.4,
            max_cost_per_request: None,
            max_latency_ms: None,
            prefer_provider: None,
            fallback_models: Vec::new(),
        }
    }
}

impl RoutingPolicy {
    /// Weights normalized to sum to 1. A degenerate all-zero policy
    /// falls back to pure quality.
    fn normalized_weights(&self) -> (f64, f64, f64) {
        let sum = self.w_cost + self.w_latency + self.w_quality;
        if sum <= f64::EPSILON {
            return (0.0, 0.0, 1.0);
        }
        (self.w_cost / sum, self.w_latency / sum, self.w_quality / sum)
    }
}

/// Rolling mean latency per qualified model id, fed by completed calls.
#[derive(Debug, Default)]
pub struct PerformanceHistory {
    samples: DashMap<String, (u64, f64)>,
}

impl PerformanceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed latency.
    pub fn observe(&self, qualified_id: &str, latency_ms: f64) {
        let mut entry = self.samples.entry(qualified_id.to_string()).or_insert((0, 0.0));
        let (count, mean) = *entry;
        let n = count as f64;
        *entry = (count + 1, (mean * n + latency_ms) / (n + 1.0));
    }

    /// Observed mean latency, if any call completed yet.
    pub fn mean_latency_ms(&self, qualified_id: &str) -> Option<f64> {
        self.samples.get(qualified_id).map(|e| e.1)
    }
}

/// Shared history handle.
pub type PerformanceHistoryRef = Arc<PerformanceHistory>;

/// Expected latency for scoring: observed history first, catalog value
/// otherwise, a neutral constant when neither exists.
fn expected_latency(desc: &ModelDescriptor, history: &PerformanceHistory) -> f64 {
    history
        .mean_latency_ms(&desc.qualified_id())
        .or(desc.avg_latency_ms)
        .unwrap_or(1000.0)
}

fn estimated_cost(desc: &ModelDescriptor, requirements: &ModelRequirements) -> f64 {
    (requirements.estimated_prompt_tokens as f64 * desc.input_cost_per_million_tokens
        + requirements.max_tokens as f64 * desc.output_cost_per_million_tokens)
        / 1_000_000.0
}

/// Pick the best model for the requirements under the policy,
/// considering every model in the registry.
pub fn recommend_model(
    registry: &ModelRegistry,
    history: &PerformanceHistory,
    requirements: &ModelRequirements,
    policy: &RoutingPolicy,
) -> HiveResult<String> {
    recommend_from(registry.all(), history, requirements, policy)
}

/// Pick the best model from an explicit candidate pool (e.g. only the
/// models whose providers have credentials).
///
/// Returns the qualified id of the winner, or Capacity when no model
/// survives the filters.
pub fn recommend_from<'a>(
    pool: impl IntoIterator<Item = &'a ModelDescriptor>,
    history: &PerformanceHistory,
    requirements: &ModelRequirements,
    policy: &RoutingPolicy,
) -> HiveResult<String> {
    let needed_window = requirements.estimated_prompt_tokens + requirements.max_tokens;

    // 1-2. capability/context filter, then hard caps.
    let candidates: Vec<&ModelDescriptor> = pool
        .into_iter()
        .filter(|d| d.supports_all(&requirements.capabilities))
        .filter(|d| d.context_window >= needed_window)
        .filter(|d| {
            policy
                .max_cost_per_request
                .map_or(true, |cap| estimated_cost(d, requirements) <= cap)
        })
        .filter(|d| {
            policy
                .max_latency_ms
                .map_or(true, |cap| expected_latency(d, history) <= cap)
        })
        .collect();

    if candidates.is_empty() {
        return Err(HiveError::capacity(
            "no model satisfies the requested capabilities and caps",
        )
        .with_code("no_eligible_model"));
    }

    // 3. min-max normalize cost and latency across the candidate set.
    let costs: Vec<f64> = candidates
        .iter()
        .map(|d| estimated_cost(d, requirements))
        .collect();
    let latencies: Vec<f64> = candidates
        .iter()
        .map(|d| expected_latency(d, history))
        .collect();
    let (cost_min, cost_max) = min_max(&costs);
    let (lat_min, lat_max) = min_max(&latencies);
    let (w_cost, w_latency, w_quality) = policy.normalized_weights();

    let mut best: Option<(&ModelDescriptor, f64)> = None;
    for (idx, desc) in candidates.iter().copied().enumerate() {
        let cost_norm = normalize(costs[idx], cost_min, cost_max);
        let lat_norm = normalize(latencies[idx], lat_min, lat_max);
        let quality = desc.quality_score.unwrap_or(0.5);

        let mut score = w_quality * quality - w_cost * cost_norm - w_latency * lat_norm;

        // 4. preference bonus decides ties only.
        if let Some(preferred) = &policy.prefer_provider {
            if &desc.provider == preferred {
                score += PREFER_PROVIDER_BONUS;
            }
        }

        let better = match best {
            None => true,
            Some((current, current_score)) => {
                score > current_score
                    // Stable ordering when the bonus also ties.
                    || (score == current_score
                        && desc.qualified_id() < current.qualified_id())
            }
        };
        if better {
            best = Some((desc, score));
        }
    }

    let (winner, score) = best.expect("candidate set is non-empty");
    tracing::debug!(
        model = %winner.qualified_id(),
        score,
        candidates = candidates.len(),
        "routing decision"
    );
    Ok(winner.qualified_id())
}

fn min_max(values: &[f64]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }
    (min, max)
}

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if (max - min).abs() <= f64::EPSILON {
        0.0
    } else {
        (value - min) / (max - min)
    }
}
