//! Workforce agent: prompt engine plus provider gateway
//!
//! An agent is a thin composition: the prompt generator and contextual
//! memory produce the prompt, the Model Integration Layer executes it,
//! and the profile's rolling counters absorb the outcome.

use hive_core::{AgentProfile, AgentStatus, HiveResult, ModelCapability};
use hive_die::{ContextualMemory, PromptGenerator};
use hive_llm::{LlmRequest, LlmResponse, ModelIntegrationLayer, ModelRequirements, RoutingPolicy};
use hive_sessions::PlanEstimator;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One executing agent bound to a session.
pub struct WorkforceAgent {
    profile: Mutex<AgentProfile>,
    memory: Mutex<ContextualMemory>,
    generator: Arc<PromptGenerator>,
    mil: Arc<ModelIntegrationLayer>,
}

impl WorkforceAgent {
    pub fn new(
        profile: AgentProfile,
        generator: Arc<PromptGenerator>,
        mil: Arc<ModelIntegrationLayer>,
    ) -> Self {
        Self {
            profile: Mutex::new(profile),
            memory: Mutex::new(ContextualMemory::new()),
            generator,
            mil,
        }
    }

    /// Profile snapshot.
    pub fn profile(&self) -> AgentProfile {
        self.profile.lock().clone()
    }

    /// Execute one task with an explicit usage-attribution tag instead
    /// of the default role tag.
    pub async fn execute_tagged(
        &self,
        task_description: &str,
        task_tag: &str,
    ) -> HiveResult<LlmResponse> {
        self.execute_inner(task_description, HashMap::new(), None, Some(task_tag))
            .await
    }

    /// Execute one task. The response is recorded into memory and the
    /// profile counters before it is returned.
    pub async fn execute(
        &self,
        task_description: &str,
        extra_variables: HashMap<String, Value>,
        policy: Option<&RoutingPolicy>,
    ) -> HiveResult<LlmResponse> {
        self.execute_inner(task_description, extra_variables, policy, None)
            .await
    }

    async fn execute_inner(
        &self,
        task_description: &str,
        extra_variables: HashMap<String, Value>,
        policy: Option<&RoutingPolicy>,
        task_tag: Option<&str>,
    ) -> HiveResult<LlmResponse> {
        let (name, role, system_prompt, temperature, max_tokens) = {
            let mut profile = self.profile.lock();
            profile.status = AgentStatus::Busy;
            (
                profile.name.clone(),
                profile.role,
                profile.system_prompt.clone(),
                profile.temperature,
                profile.max_tokens,
            )
        };

        let tag = task_tag.unwrap_or(role.as_str()).to_string();
        let result = self
            .run_task(
                task_description,
                extra_variables,
                policy,
                &system_prompt,
                role.as_str(),
                &tag,
                temperature,
                max_tokens,
            )
            .await;

        let mut profile = self.profile.lock();
        match &result {
            Ok(resp) => {
                profile.status = AgentStatus::Idle;
                profile
                    .stats
                    .observe(resp.total_tokens() as u64, resp.latency_ms);
            }
            Err(err) => {
                profile.status = AgentStatus::Error;
                tracing::warn!(agent = %name, error = %err, "agent execution failed");
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_task(
        &self,
        task_description: &str,
        extra_variables: HashMap<String, Value>,
        policy: Option<&RoutingPolicy>,
        system_prompt: &str,
        role: &str,
        task_tag: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> HiveResult<LlmResponse> {
        // Resolve the model first so prompt formatting can adapt to it.
        let requirements = ModelRequirements {
            capabilities: vec![ModelCapability::TextGeneration],
            estimated_prompt_tokens: hive_llm::estimate_tokens(task_description) + 256,
            max_tokens,
        };
        let default_policy = RoutingPolicy::default();
        let policy = policy.unwrap_or(&default_policy);
        let model = self.mil.recommend_model(&requirements, policy)?;

        let mut variables: HashMap<String, Value> = HashMap::new();
        variables.insert("task_description".to_string(), json!(task_description));
        variables.insert(
            "output_format".to_string(),
            json!("Clear, well-structured prose"),
        );
        variables.extend(extra_variables);

        let prompt = {
            let memory = self.memory.lock();
            self.generator
                .generate("general", &variables, &memory, role, &model)?
        };

        let request = LlmRequest::new(prompt)
            .with_model(model)
            .with_system_prompt(system_prompt)
            .with_temperature(temperature)
            .with_max_tokens(max_tokens)
            .with_task_type(task_tag);

        let response = self.mil.generate(&request, Some(policy)).await?;

        let mut memory = self.memory.lock();
        memory.update_context([
            ("last_task".to_string(), json!(task_description)),
            (
                "last_response_digest".to_string(),
                json!(truncate(&response.content, 240)),
            ),
        ]);
        Ok(response)
    }

    /// Record a durable fact into the agent's long-term memory.
    pub fn remember(&self, key: &str, value: Value) {
        self.memory.lock().remember(key, value);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "..."
    }
}

/// Plan estimator backed by the router: duration from the recommended
/// model's expected latency class, cost from its prices at a nominal
/// 1k-token answer.
pub struct RouterPlanEstimator {
    mil: Arc<ModelIntegrationLayer>,
}

impl RouterPlanEstimator {
    pub fn new(mil: Arc<ModelIntegrationLayer>) -> Self {
        Self { mil }
    }
}

impl PlanEstimator for RouterPlanEstimator {
    fn estimate(&self, task_description: &str) -> (u64, f64) {
        let requirements = ModelRequirements {
            capabilities: vec![ModelCapability::TextGeneration],
            estimated_prompt_tokens: hive_llm::estimate_tokens(task_description),
            max_tokens: 1024,
        };
        let recommended = self
            .mil
            .recommend_model(&requirements, &RoutingPolicy::default());
        match recommended.ok().and_then(|id| {
            self.mil
                .registry()
                .get(&id)
                .map(|d| (d.avg_latency_ms.unwrap_or(1000.0), d.cost_of(requirements.estimated_prompt_tokens, 1024)))
        }) {
            Some((latency_ms, cost)) => {
                let duration_secs = ((latency_ms / 1000.0).ceil() as u64).max(1) * 3;
                (duration_secs, cost)
            }
            None => (60, 0.01),
        }
    }
}
