//! Quantum tasks: scored parallel variations with a collapse strategy
//!
//! A generalization of heavy analysis: one task description executed
//! under several configured variations (role, model override, prompt
//! modifiers, parameter overrides), each thread scored against a
//! metrics configuration, and the set collapsed into one result.

use hive_core::{HiveError, HiveResult};
use hive_llm::{LlmRequest, ModelIntegrationLayer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// How the parallel thread results reduce to one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollapseStrategy {
    FirstSuccess,
    BestScore,
    Consensus,
    Combined,
    Weighted,
}

/// Metric weighting and normalization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Weight per metric name
    pub weights: HashMap<String, f64>,
    /// Execution time treated as "slow" for normalization
    pub max_execution_time_secs: f64,
    /// Response length treated as "complete" for normalization
    pub target_response_chars: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert("success_rate".to_string(), 0.3);
        weights.insert("completeness".to_string(), 0.4);
        weights.insert("execution_time".to_string(), 0.3);
        Self {
            weights,
            max_execution_time_secs: 60.0,
            target_response_chars: 800,
        }
    }
}

/// Prompt modifiers applied around the task description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptModifiers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// Parameter overrides for one variation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariationParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One configured way to execute the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variation {
    pub name: String,
    /// Agent role framing for the system prompt
    pub agent_role: String,
    /// Provider override; informational when `model` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model override (qualified or bare id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt_modifiers: PromptModifiers,
    #[serde(default)]
    pub parameters: VariationParameters,
    /// Weight for the weighted collapse strategy
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// The task itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantumTask {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub collapse_strategy: CollapseStrategy,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub variations: Vec<Variation>,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_parallel() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    300
}

impl QuantumTask {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        collapse_strategy: CollapseStrategy,
        variations: Vec<Variation>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            collapse_strategy,
            metrics: MetricsConfig::default(),
            variations,
            max_parallel: default_max_parallel(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Thread lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Outcome of one variation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadResult {
    pub variation_name: String,
    pub status: ThreadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub execution_time: f64,
    pub metrics: HashMap<String, f64>,
    pub total_score: f64,
    pub tokens_used: u32,
    pub cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

impl ThreadResult {
    fn succeeded(&self) -> bool {
        self.status == ThreadStatus::Completed
    }
}

/// Collapsed task outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantumOutcome {
    pub task_id: Uuid,
    /// "completed" or "failed"
    pub status: String,
    pub thread_results: Vec<ThreadResult>,
    pub collapsed_result: serde_json::Value,
    pub final_metrics: HashMap<String, f64>,
    pub execution_summary: serde_json::Value,
    pub total_execution_time: f64,
}

/// Executes quantum tasks against the provider gateway.
pub struct QuantumExecutor {
    mil: Arc<ModelIntegrationLayer>,
}

impl QuantumExecutor {
    pub fn new(mil: Arc<ModelIntegrationLayer>) -> Self {
        Self { mil }
    }

    /// Run every variation (bounded by `max_parallel`), score the
    /// threads, and collapse.
    pub async fn run(&self, task: &QuantumTask) -> HiveResult<QuantumOutcome> {
        if task.variations.is_empty() {
            return Err(HiveError::validation(
                "quantum task requires at least one variation",
            ));
        }

        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(task.max_parallel.max(1)));
        let timeout = Duration::from_secs(task.timeout_secs);

        let mut handles = Vec::with_capacity(task.variations.len());
        for variation in task.variations.clone() {
            let mil = self.mil.clone();
            let description = task.description.clone();
            let metrics = task.metrics.clone();
            let semaphore = semaphore.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run_variation(&mil, &description, &variation, &metrics, timeout).await
            }));
        }

        // join_all keeps variation order, which collapse relies on.
        let mut results = Vec::with_capacity(handles.len());
        for (idx, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(result) => results.push(result),
                Err(join_err) => results.push(ThreadResult {
                    variation_name: task.variations[idx].name.clone(),
                    status: ThreadStatus::Failed,
                    response: None,
                    error_message: Some(format!("thread panicked: {}", join_err)),
                    execution_time: 0.0,
                    metrics: HashMap::new(),
                    total_score: 0.0,
                    tokens_used: 0,
                    cost: 0.0,
                    provider_used: None,
                    model_used: None,
                }),
            }
        }

        let collapsed = collapse(task, &results);
        let any_success = results.iter().any(ThreadResult::succeeded);

        let final_metrics = aggregate_metrics(&results);
        let execution_summary = serde_json::json!({
            "variations": results.len(),
            "succeeded": results.iter().filter(|r| r.succeeded()).count(),
            "total_tokens": results.iter().map(|r| r.tokens_used as u64).sum::<u64>(),
            "total_cost_usd": results.iter().map(|r| r.cost).sum::<f64>(),
            "strategy": task.collapse_strategy,
        });

        Ok(QuantumOutcome {
            task_id: task.id,
            status: if any_success { "completed" } else { "failed" }.to_string(),
            thread_results: results,
            collapsed_result: collapsed,
            final_metrics,
            execution_summary,
            total_execution_time: started.elapsed().as_secs_f64(),
        })
    }
}

async fn run_variation(
    mil: &ModelIntegrationLayer,
    description: &str,
    variation: &Variation,
    metrics: &MetricsConfig,
    timeout: Duration,
) -> ThreadResult {
    let mut prompt = String::new();
    if let Some(prefix) = &variation.prompt_modifiers.prefix {
        prompt.push_str(prefix);
        prompt.push_str("\n\n");
    }
    prompt.push_str(description);
    if let Some(suffix) = &variation.prompt_modifiers.suffix {
        prompt.push_str("\n\n");
        prompt.push_str(suffix);
    }

    let mut request = LlmRequest::new(prompt)
        .with_system_prompt(format!(
            "You are acting as a {} for this task.",
            variation.agent_role
        ))
        .with_capabilities(vec![hive_core::ModelCapability::TextGeneration])
        .with_task_type(format!("quantum:{}", variation.name));
    if let Some(model) = &variation.model {
        request = request.with_model(model.clone());
    }
    if let Some(temperature) = variation.parameters.temperature {
        request = request.with_temperature(temperature);
    }
    if let Some(max_tokens) = variation.parameters.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }

    let started = Instant::now();
    let result = tokio::time::timeout(timeout, mil.generate(&request, None)).await;
    let execution_time = started.elapsed().as_secs_f64();

    match result {
        Ok(Ok(response)) => {
            let scored = score_metrics(metrics, execution_time, &response.content, true);
            ThreadResult {
                variation_name: variation.name.clone(),
                status: ThreadStatus::Completed,
                total_score: total_score(metrics, &scored),
                metrics: scored,
                tokens_used: response.total_tokens(),
                cost: response.cost_usd,
                provider_used: Some(response.provider.clone()),
                model_used: Some(response.model_used.clone()),
                response: Some(response.content),
                error_message: None,
                execution_time,
            }
        }
        Ok(Err(err)) => ThreadResult {
            variation_name: variation.name.clone(),
            status: ThreadStatus::Failed,
            response: None,
            error_message: Some(err.user_message.clone()),
            execution_time,
            metrics: score_metrics(metrics, execution_time, "", false),
            total_score: 0.0,
            tokens_used: 0,
            cost: 0.0,
            provider_used: None,
            model_used: None,
        },
        Err(_) => ThreadResult {
            variation_name: variation.name.clone(),
            status: ThreadStatus::Cancelled,
            response: None,
            error_message: Some("variation timed out".to_string()),
            execution_time,
            metrics: score_metrics(metrics, execution_time, "", false),
            total_score: 0.0,
            tokens_used: 0,
            cost: 0.0,
            provider_used: None,
            model_used: None,
        },
    }
}

/// Score the configured metrics for one thread, each in [0, 1].
fn score_metrics(
    config: &MetricsConfig,
    execution_time: f64,
    response: &str,
    success: bool,
) -> HashMap<String, f64> {
    let mut out = HashMap::new();
    for metric in config.weights.keys() {
        let value = match metric.as_str() {
            "success_rate" => {
                if success {
                    1.0
                } else {
                    0.0
                }
            }
            "completeness" => {
                (response.chars().count() as f64 / config.target_response_chars as f64).min(1.0)
            }
            "execution_time" => {
                1.0 - (execution_time / config.max_execution_time_secs).min(1.0)
            }
            _ => 0.0,
        };
        out.insert(metric.clone(), value);
    }
    out
}

fn total_score(config: &MetricsConfig, metrics: &HashMap<String, f64>) -> f64 {
    let weight_sum: f64 = config.weights.values().sum();
    if weight_sum <= f64::EPSILON {
        return 0.0;
    }
    config
        .weights
        .iter()
        .map(|(name, weight)| weight * metrics.get(name).copied().unwrap_or(0.0))
        .sum::<f64>()
        / weight_sum
}

fn aggregate_metrics(results: &[ThreadResult]) -> HashMap<String, f64> {
    let succeeded: Vec<&ThreadResult> = results.iter().filter(|r| r.succeeded()).collect();
    let mut out = HashMap::new();
    out.insert(
        "success_rate".to_string(),
        succeeded.len() as f64 / results.len() as f64,
    );
    if let Some(best) = succeeded
        .iter()
        .map(|r| r.total_score)
        .fold(None, |acc: Option<f64>, s| {
            Some(acc.map_or(s, |a| a.max(s)))
        })
    {
        out.insert("best_score".to_string(), best);
    }
    out
}

/// Reduce thread results to a single value per the strategy.
fn collapse(task: &QuantumTask, results: &[ThreadResult]) -> serde_json::Value {
    let successes: Vec<(usize, &ThreadResult)> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.succeeded())
        .collect();

    if successes.is_empty() {
        return serde_json::json!({
            "strategy": task.collapse_strategy,
            "result": null,
            "reason": "no variation succeeded",
        });
    }

    let pick = |idx: usize, result: &ThreadResult| {
        serde_json::json!({
            "strategy": task.collapse_strategy,
            "variation": result.variation_name,
            "result": result.response,
            "score": result.total_score,
            "weight": task.variations.get(idx).map(|v| v.weight),
        })
    };

    match task.collapse_strategy {
        CollapseStrategy::FirstSuccess => {
            let (idx, result) = successes[0];
            pick(idx, result)
        }
        CollapseStrategy::BestScore => {
            let (idx, result) = successes
                .iter()
                .copied()
                .max_by(|a, b| {
                    a.1.total_score
                        .partial_cmp(&b.1.total_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("non-empty successes");
            pick(idx, result)
        }
        CollapseStrategy::Weighted => {
            let (idx, result) = successes
                .iter()
                .copied()
                .max_by(|a, b| {
                    let wa = task.variations.get(a.0).map(|v| v.weight).unwrap_or(1.0)
                        * a.1.total_score;
                    let wb = task.variations.get(b.0).map(|v| v.weight).unwrap_or(1.0)
                        * b.1.total_score;
                    wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("non-empty successes");
            pick(idx, result)
        }
        CollapseStrategy::Consensus => {
            // Group equivalent responses; the largest group wins, ties
            // broken by score.
            let mut groups: HashMap<String, Vec<(usize, &ThreadResult)>> = HashMap::new();
            for &(idx, result) in &successes {
                let key = result
                    .response
                    .as_deref()
                    .unwrap_or_default()
                    .trim()
                    .to_lowercase();
                groups.entry(key).or_default().push((idx, result));
            }
            let winner = groups
                .values()
                .max_by(|a, b| {
                    a.len().cmp(&b.len()).then(
                        best_score(a)
                            .partial_cmp(&best_score(b))
                            .unwrap_or(std::cmp::Ordering::Equal),
                    )
                })
                .expect("non-empty groups");
            let (idx, result) = winner[0];
            let mut value = pick(idx, result);
            value["agreement"] = serde_json::json!(winner.len() as f64 / successes.len() as f64);
            value
        }
        CollapseStrategy::Combined => {
            let combined = successes
                .iter()
                .map(|(_, r)| {
                    format!(
                        "[{}]\n{}",
                        r.variation_name,
                        r.response.as_deref().unwrap_or_default()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            serde_json::json!({
                "strategy": task.collapse_strategy,
                "result": combined,
                "variations": successes.iter().map(|(_, r)| r.variation_name.clone()).collect::<Vec<_>>(),
            })
        }
    }
}

fn best_score(group: &[(usize, &ThreadResult)]) -> f64 {
    group
        .iter()
        .map(|(_, r)| r.total_score)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_llm::testing::ScriptedProvider;
    use hive_llm::MilBuilder;

    fn mil() -> Arc<ModelIntegrationLayer> {
        Arc::new(
            MilBuilder::new()
                .with_provider(Arc::new(ScriptedProvider::openai_echo()))
                .build(),
        )
    }

    fn variation(name: &str, prefix: &str, weight: f64) -> Variation {
        Variation {
            name: name.to_string(),
            agent_role: "analyst".to_string(),
            provider: None,
            model: Some("openai/gpt-4o-mini".to_string()),
            prompt_modifiers: PromptModifiers {
                prefix: Some(prefix.to_string()),
                suffix: None,
            },
            parameters: VariationParameters::default(),
            weight,
        }
    }

    #[tokio::test]
    async fn test_run_scores_all_variations() {
        let executor = QuantumExecutor::new(mil());
        let task = QuantumTask::new(
            "compare",
            "evaluate the options",
            CollapseStrategy::BestScore,
            vec![
                variation("short", "Be terse.", 1.0),
                variation("long", "Be exhaustive and detailed.", 1.0),
            ],
        );

        let outcome = executor.run(&task).await.unwrap();
        assert_eq!(outcome.status, "completed");
        assert_eq!(outcome.thread_results.len(), 2);
        for result in &outcome.thread_results {
            assert_eq!(result.status, ThreadStatus::Completed);
            assert!(result.total_score > 0.0);
            assert!(result.metrics.contains_key("completeness"));
            assert!(result.tokens_used > 0);
        }
        assert_eq!(outcome.final_metrics.get("success_rate"), Some(&1.0));
        assert!(outcome.collapsed_result.get("result").is_some());
    }

    #[tokio::test]
    async fn test_first_success_picks_variation_order() {
        let executor = QuantumExecutor::new(mil());
        let task = QuantumTask::new(
            "first",
            "answer",
            CollapseStrategy::FirstSuccess,
            vec![variation("alpha", "A", 1.0), variation("beta", "B", 1.0)],
        );

        let outcome = executor.run(&task).await.unwrap();
        assert_eq!(outcome.collapsed_result["variation"], "alpha");
    }

    #[tokio::test]
    async fn test_weighted_collapse_prefers_heavier_variation() {
        let executor = QuantumExecutor::new(mil());
        // Same provider behavior, so scores are close; weight decides.
        let task = QuantumTask::new(
            "weighted",
            "answer",
            CollapseStrategy::Weighted,
            vec![variation("light", "A", 0.1), variation("heavy", "A", 10.0)],
        );

        let outcome = executor.run(&task).await.unwrap();
        assert_eq!(outcome.collapsed_result["variation"], "heavy");
    }

    #[tokio::test]
    async fn test_combined_collapse_includes_all() {
        let executor = QuantumExecutor::new(mil());
        let task = QuantumTask::new(
            "combined",
            "answer",
            CollapseStrategy::Combined,
            vec![variation("alpha", "A", 1.0), variation("beta", "B", 1.0)],
        );

        let outcome = executor.run(&task).await.unwrap();
        let combined = outcome.collapsed_result["result"].as_str().unwrap();
        assert!(combined.contains("[alpha]"));
        assert!(combined.contains("[beta]"));
    }

    #[tokio::test]
    async fn test_all_failed_collapse() {
        let mil = Arc::new(
            MilBuilder::new()
                .with_provider(Arc::new(ScriptedProvider::openai_echo().failing_first_n(
                    2,
                    hive_core::HiveError::provider("down", false),
                )))
                .build(),
        );
        let executor = QuantumExecutor::new(mil);
        let task = QuantumTask::new(
            "doomed",
            "answer",
            CollapseStrategy::BestScore,
            vec![variation("a", "A", 1.0), variation("b", "B", 1.0)],
        );

        let outcome = executor.run(&task).await.unwrap();
        assert_eq!(outcome.status, "failed");
        assert!(outcome.collapsed_result["result"].is_null());
    }

    #[tokio::test]
    async fn test_empty_variations_rejected() {
        let executor = QuantumExecutor::new(mil());
        let task = QuantumTask::new("empty", "x", CollapseStrategy::BestScore, vec![]);
        let err = executor.run(&task).await.unwrap_err();
        assert_eq!(err.kind, hive_core::ErrorKind::Validation);
    }

    #[test]
    fn test_metric_scoring() {
        let config = MetricsConfig::default();
        let scored = score_metrics(&config, 6.0, &"x".repeat(400), true);
        assert_eq!(scored["success_rate"], 1.0);
        assert!((scored["completeness"] - 0.5).abs() < 1e-9);
        assert!((scored["execution_time"] - 0.9).abs() < 1e-9);

        let total = total_score(&config, &scored);
        assert!(total > 0.0 && total <= 1.0);
    }
}
