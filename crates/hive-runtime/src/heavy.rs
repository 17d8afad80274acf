//! Heavy analysis: fan-out/fan-in multi-agent ensemble
//!
//! One user query becomes N specialized sub-queries executed by N
//! parallel agent workers under a global deadline; the successful
//! responses are synthesized into a single answer. Without a configured
//! provider, decomposition and synthesis fall back to deterministic
//! templates so the pipeline stays usable end to end.

use hive_core::{constants::timeouts, AgentProfile, AgentRole, HiveError, HiveResult};
use hive_die::PromptGenerator;
use hive_llm::{ChatMessage, LlmRequest, ModelIntegrationLayer};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::agent::WorkforceAgent;

/// Worker lifecycle states, reported in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkerState {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// One progress update for one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerUpdate {
    pub state: WorkerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Progress tracker for a running analysis. Updates are totally
/// ordered per worker.
pub struct AnalysisProgress {
    workers: Mutex<Vec<Vec<WorkerUpdate>>>,
    started: Instant,
}

impl AnalysisProgress {
    pub fn new(num_workers: usize) -> Self {
        Self {
            workers: Mutex::new(vec![
                vec![WorkerUpdate {
                    state: WorkerState::Queued,
                    stage: None,
                }];
                num_workers
            ]),
            started: Instant::now(),
        }
    }

    /// Append a progress update for one worker.
    pub fn update(&self, worker: usize, state: WorkerState, stage: Option<&str>) {
        let mut workers = self.workers.lock();
        if let Some(updates) = workers.get_mut(worker) {
            updates.push(WorkerUpdate {
                state,
                stage: stage.map(str::to_string),
            });
        }
    }

    /// Latest state per worker.
    pub fn current_states(&self) -> Vec<WorkerState> {
        self.workers
            .lock()
            .iter()
            .map(|updates| updates.last().map(|u| u.state).unwrap_or(WorkerState::Queued))
            .collect()
    }

    /// Full ordered history for one worker.
    pub fn history(&self, worker: usize) -> Vec<WorkerUpdate> {
        self.workers
            .lock()
            .get(worker)
            .cloned()
            .unwrap_or_default()
    }

    /// Seconds since the analysis started.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Individual worker outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub agent_id: usize,
    /// "success" or "error"
    pub status: String,
    pub response: String,
    pub execution_time: f64,
}

impl AgentOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == "success"
    }
}

/// Final analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeavyAnalysisResult {
    pub task_id: String,
    /// "completed" or "failed"
    pub status: String,
    pub result: String,
    pub execution_time: f64,
    pub num_agents: usize,
    pub agent_results: Vec<AgentOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct HeavyAnalysisConfig {
    pub default_num_agents: usize,
    /// Global wall-clock deadline
    pub total_timeout: Duration,
    /// Per-worker deadline
    pub worker_timeout: Duration,
    /// Synthesis call deadline
    pub synthesis_timeout: Duration,
}

impl Default for HeavyAnalysisConfig {
    fn default() -> Self {
        Self {
            default_num_agents: 4,
            total_timeout: Duration::from_secs(timeouts::HEAVY_ANALYSIS_SECS),
            worker_timeout: Duration::from_secs(timeouts::PROVIDER_CALL_SECS * 2),
            synthesis_timeout: Duration::from_secs(timeouts::SYNTHESIS_CALL_SECS),
        }
    }
}

/// Roles assigned to workers, cycled by index.
const WORKER_ROLES: &[AgentRole] = &[
    AgentRole::Researcher,
    AgentRole::Analyst,
    AgentRole::Validator,
    AgentRole::Reviewer,
];

/// Deterministic perspectives used when no provider can decompose.
const FALLBACK_PERSPECTIVES: &[&str] = &[
    "Research comprehensive background information about: {q}",
    "Analyze and evaluate the key aspects of: {q}",
    "Verify facts and identify potential inaccuracies in claims about: {q}",
    "Provide alternative perspectives and counterpoints on: {q}",
    "Summarize the practical implications of: {q}",
    "Identify risks and open questions around: {q}",
    "Compare competing approaches related to: {q}",
    "Assess the long-term outlook for: {q}",
];

/// The fan-out/fan-in orchestrator.
pub struct HeavyAnalysisService {
    mil: Arc<ModelIntegrationLayer>,
    generator: Arc<PromptGenerator>,
    config: HeavyAnalysisConfig,
}

impl HeavyAnalysisService {
    pub fn new(mil: Arc<ModelIntegrationLayer>) -> Self {
        Self {
            mil,
            generator: Arc::new(PromptGenerator::new()),
            config: HeavyAnalysisConfig::default(),
        }
    }

    pub fn with_config(mut self, config: HeavyAnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Split a query into `num_agents` specialized sub-queries.
    ///
    /// Uses an LLM when a provider is configured; otherwise the
    /// deterministic perspective templates.
    pub async fn decompose(&self, query: &str, num_agents: usize) -> HiveResult<Vec<String>> {
        if self.mil.has_providers() {
            match self.decompose_with_llm(query, num_agents).await {
                Ok(questions) if questions.len() == num_agents => return Ok(questions),
                Ok(questions) => {
                    tracing::warn!(
                        got = questions.len(),
                        wanted = num_agents,
                        "decomposition returned wrong count, using fallback"
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, "LLM decomposition failed, using fallback");
                }
            }
        }
        Ok(fallback_questions(query, num_agents))
    }

    async fn decompose_with_llm(&self, query: &str, num_agents: usize) -> HiveResult<Vec<String>> {
        let prompt = format!(
            "Generate exactly {} distinct research questions that together give a \
             comprehensive, multi-perspective understanding of the topic below. \
             Return one question per line with no numbering.\n\nTopic: {}",
            num_agents, query
        );
        let request = LlmRequest::new(prompt)
            .with_max_tokens(512)
            .with_temperature(0.7)
            .with_capabilities(vec![hive_core::ModelCapability::TextGeneration])
            .with_task_type("decomposition");
        let response = self.mil.generate(&request, None).await?;

        let questions: Vec<String> = response
            .content
            .lines()
            .map(|line| line.trim().trim_start_matches(['-', '*', ' ']).to_string())
            .filter(|line| !line.is_empty())
            .take(num_agents)
            .collect();
        Ok(questions)
    }

    /// Run the full pipeline: decompose, fan out, collect, synthesize.
    pub async fn execute(&self, query: &str, num_agents: usize) -> HiveResult<HeavyAnalysisResult> {
        if query.is_empty() || query.chars().count() > 2000 {
            return Err(HiveError::validation(
                "query must be between 1 and 2000 characters",
            ));
        }
        if !(2..=8).contains(&num_agents) {
            return Err(HiveError::validation("num_agents must be between 2 and 8"));
        }

        let task_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        tracing::info!(task_id = %task_id, num_agents, "heavy analysis started");

        let sub_queries = self.decompose(query, num_agents).await?;
        let progress = Arc::new(AnalysisProgress::new(num_agents));

        // Fan out one worker per sub-query.
        let mut handles = Vec::with_capacity(num_agents);
        for (idx, sub_query) in sub_queries.iter().enumerate() {
            let role = WORKER_ROLES[idx % WORKER_ROLES.len()];
            let agent = WorkforceAgent::new(
                AgentProfile::new(format!("heavy-worker-{}", idx), role),
                self.generator.clone(),
                self.mil.clone(),
            );
            let sub_query = sub_query.clone();
            let progress = progress.clone();
            let worker_timeout = self.config.worker_timeout;

            handles.push(tokio::spawn(async move {
                progress.update(idx, WorkerState::Processing, Some("calling model"));
                let worker_started = Instant::now();
                let result = tokio::time::timeout(
                    worker_timeout,
                    agent.execute(&sub_query, HashMap::new(), None),
                )
                .await;
                let execution_time = worker_started.elapsed().as_secs_f64();

                match result {
                    Ok(Ok(response)) => {
                        progress.update(idx, WorkerState::Completed, None);
                        AgentOutcome {
                            agent_id: idx,
                            status: "success".to_string(),
                            response: response.content,
                            execution_time,
                        }
                    }
                    Ok(Err(err)) => {
                        progress.update(idx, WorkerState::Failed, Some("error"));
                        AgentOutcome {
                            agent_id: idx,
                            status: "error".to_string(),
                            response: err.user_message.clone(),
                            execution_time,
                        }
                    }
                    Err(_) => {
                        progress.update(idx, WorkerState::Failed, Some("timeout"));
                        AgentOutcome {
                            agent_id: idx,
                            status: "error".to_string(),
                            response: "timeout".to_string(),
                            execution_time,
                        }
                    }
                }
            }));
        }

        // Collect until the global deadline; stragglers are cancelled
        // and recorded as failed with reason timeout.
        let mut outcomes: Vec<AgentOutcome> = Vec::with_capacity(num_agents);
        let deadline = tokio::time::Instant::now() + self.config.total_timeout;
        for (idx, mut handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(join_err)) => {
                    progress.update(idx, WorkerState::Failed, Some("panic"));
                    outcomes.push(AgentOutcome {
                        agent_id: idx,
                        status: "error".to_string(),
                        response: format!("worker panicked: {}", join_err),
                        execution_time: started.elapsed().as_secs_f64(),
                    });
                }
                Err(_) => {
                    handle.abort();
                    progress.update(idx, WorkerState::Cancelled, Some("deadline"));
                    progress.update(idx, WorkerState::Failed, Some("timeout"));
                    outcomes.push(AgentOutcome {
                        agent_id: idx,
                        status: "error".to_string(),
                        response: "timeout".to_string(),
                        execution_time: started.elapsed().as_secs_f64(),
                    });
                }
            }
        }

        let result = self.synthesize(query, &outcomes).await;
        let execution_time = started.elapsed().as_secs_f64();
        let any_success = outcomes.iter().any(AgentOutcome::succeeded);
        tracing::info!(
            task_id = %task_id,
            execution_time,
            successes = outcomes.iter().filter(|o| o.succeeded()).count(),
            "heavy analysis finished"
        );

        Ok(HeavyAnalysisResult {
            task_id,
            status: if any_success { "completed" } else { "failed" }.to_string(),
            error: (!any_success).then(|| "all agents failed".to_string()),
            result,
            execution_time,
            num_agents,
            agent_results: outcomes,
        })
    }

    /// Combine worker outcomes. Inputs are assembled in worker-index
    /// order for determinism.
    pub async fn synthesize(&self, query: &str, outcomes: &[AgentOutcome]) -> String {
        let successes: Vec<&AgentOutcome> =
            outcomes.iter().filter(|o| o.succeeded()).collect();

        match successes.len() {
            0 => {
                let failures: Vec<String> = outcomes
                    .iter()
                    .map(|o| format!("agent {}: {}", o.agent_id, o.response))
                    .collect();
                format!("All agents failed to produce a result.\n{}", failures.join("\n"))
            }
            1 => successes[0].response.clone(),
            _ => {
                let combined = successes
                    .iter()
                    .map(|o| format!("Perspective {}:\n{}", o.agent_id + 1, o.response))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                if self.mil.has_providers() {
                    if let Ok(content) = self.synthesize_with_llm(query, &combined).await {
                        return content;
                    }
                }
                format!(
                    "Combined analysis for: {}\n\n{}",
                    query, combined
                )
            }
        }
    }

    async fn synthesize_with_llm(&self, query: &str, combined: &str) -> HiveResult<String> {
        let mut request = LlmRequest::new(String::new())
            .with_max_tokens(2048)
            .with_capabilities(vec![hive_core::ModelCapability::TextGeneration])
            .with_task_type("synthesis");
        request.messages = Some(vec![
            ChatMessage::system(
                "You are a synthesis editor. Integrate the perspectives into one \
                 comprehensive, non-repetitive answer.",
            ),
            ChatMessage::user(format!(
                "Original question: {}\n\nAgent perspectives:\n\n{}",
                query, combined
            )),
        ]);

        let response = tokio::time::timeout(
            self.config.synthesis_timeout,
            self.mil.generate(&request, None),
        )
        .await
        .map_err(|_| HiveError::timeout("synthesis call exceeded its deadline"))??;
        Ok(response.content)
    }
}

/// Deterministic sub-queries for provider-less deployments.
pub fn fallback_questions(query: &str, num_agents: usize) -> Vec<String> {
    FALLBACK_PERSPECTIVES
        .iter()
        .cycle()
        .take(num_agents)
        .map(|template| template.replace("{q}", query))
        .collect()
}
