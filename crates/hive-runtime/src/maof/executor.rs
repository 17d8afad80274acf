//! Workflow DAG executor
//!
//! Ready-set scheduling: a task becomes ready when every dependency
//! completed, ready tasks start in id order up to the parallelism cap,
//! and completions promote their dependents. Retriable failures are
//! rescheduled with jittered exponential backoff while attempts remain;
//! budget checks run before every dispatch.

use chrono::{DateTime, Utc};
use hive_core::{constants::retry, ErrorKind, HiveError, HiveResult};
use hive_die::PromptGenerator;
use hive_llm::{LlmResponse, ModelIntegrationLayer, ModelRequirements, RoutingPolicy};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::{InputRef, OnFailure, TaskSpec, WorkflowDefinition};
use crate::agent::WorkforceAgent;

/// Workflow-level status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Per-task state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Ready,
    Running,
    RetryScheduled,
    Completed,
    Failed,
    Skipped,
}

/// One entry of the append-only execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub at: DateTime<Utc>,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One task's structured output, in completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultEntry {
    pub task_id: String,
    pub task_name: String,
    pub output: Value,
}

/// Final workflow outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub completed_tasks: usize,
    pub failed_tasks: Vec<String>,
    pub skipped_tasks: Vec<String>,
    /// Insertion-ordered by task completion time
    pub results: Vec<TaskResultEntry>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub execution_time: f64,
    pub log: Vec<ExecutionEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowOutcome {
    /// Output of a task by name, if it completed.
    pub fn result_of(&self, task_name: &str) -> Option<&Value> {
        self.results
            .iter()
            .find(|entry| entry.task_name == task_name)
            .map(|entry| &entry.output)
    }
}

enum WorkerMsg {
    Finished {
        task_id: String,
        result: HiveResult<LlmResponse>,
    },
    RetryDue {
        task_id: String,
    },
}

/// Executes validated workflow definitions.
pub struct WorkflowExecutor {
    mil: Arc<ModelIntegrationLayer>,
    generator: Arc<PromptGenerator>,
    retry_base: Duration,
}

impl WorkflowExecutor {
    pub fn new(mil: Arc<ModelIntegrationLayer>) -> Self {
        Self {
            mil,
            generator: Arc::new(PromptGenerator::new()),
            retry_base: Duration::from_millis(retry::BASE_DELAY_MS),
        }
    }

    /// Override the retry backoff base (tests use a tiny one).
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// Run a workflow to completion.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        input: Value,
    ) -> HiveResult<WorkflowOutcome> {
        definition.validate()?;

        let execution_id = Uuid::new_v4();
        let started = Instant::now();
        let input = Arc::new(input);
        tracing::info!(
            execution_id = %execution_id,
            workflow_id = %definition.id,
            tasks = definition.tasks.len(),
            "workflow started"
        );

        // One agent per team member; role assignment picks the first
        // member with the task's role, in team order.
        let mut agents: HashMap<Uuid, Arc<WorkforceAgent>> = HashMap::new();
        for profile in &definition.team {
            agents.insert(
                profile.id,
                Arc::new(WorkforceAgent::new(
                    profile.clone(),
                    self.generator.clone(),
                    self.mil.clone(),
                )),
            );
        }

        let specs: HashMap<String, TaskSpec> = definition
            .tasks
            .iter()
            .map(|t| (t.id.clone(), t.clone()))
            .collect();
        let mut states: HashMap<String, TaskState> = definition
            .tasks
            .iter()
            .map(|t| (t.id.clone(), TaskState::Pending))
            .collect();
        let mut attempts: HashMap<String, u32> = HashMap::new();
        let mut outputs: HashMap<String, Value> = HashMap::new();

        let mut results: Vec<TaskResultEntry> = Vec::new();
        let mut log: Vec<ExecutionEvent> = Vec::new();
        let mut failed_tasks: Vec<String> = Vec::new();
        let mut total_tokens: u64 = 0;
        let mut total_cost: f64 = 0.0;
        let mut status = WorkflowStatus::Running;
        let mut error: Option<String> = None;

        let max_parallel = definition
            .policy
            .max_parallel
            .unwrap_or_else(|| definition.team.len().min(4))
            .max(1);
        let max_duration = definition
            .policy
            .max_duration_secs
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(hive_core::constants::timeouts::WORKFLOW_SECS));

        let mut workers: JoinSet<WorkerMsg> = JoinSet::new();

        'orchestrate: loop {
            // Promote pending tasks whose dependencies resolved.
            for task in &definition.tasks {
                if states[&task.id] != TaskState::Pending {
                    continue;
                }
                let mut all_completed = true;
                let mut any_dead = false;
                for dep in &task.depends_on {
                    match states[dep] {
                        TaskState::Completed => {}
                        TaskState::Failed | TaskState::Skipped => {
                            any_dead = true;
                            all_completed = false;
                        }
                        _ => all_completed = false,
                    }
                }
                if any_dead {
                    states.insert(task.id.clone(), TaskState::Skipped);
                    push_event(&mut log, "task_skipped", Some(&task.id), Some("upstream failed"));
                } else if all_completed {
                    states.insert(task.id.clone(), TaskState::Ready);
                }
            }

            // Dispatch ready tasks in id order up to the cap.
            let running = states.values().filter(|s| **s == TaskState::Running).count();
            let mut ready: Vec<String> = states
                .iter()
                .filter(|(_, s)| **s == TaskState::Ready)
                .map(|(id, _)| id.clone())
                .collect();
            ready.sort();

            for task_id in ready.into_iter().take(max_parallel.saturating_sub(running)) {
                let spec = &specs[&task_id];

                // Budget checks run before every agent call.
                let (est_cost, est_latency) = self.estimate_call(spec);
                let over_cost = definition
                    .policy
                    .max_cost_usd
                    .is_some_and(|cap| total_cost + est_cost > cap);
                let over_time = started.elapsed() + est_latency > max_duration;
                if over_cost || over_time {
                    status = WorkflowStatus::Failed;
                    error = Some("budget_exceeded".to_string());
                    push_event(
                        &mut log,
                        "workflow_failed",
                        None,
                        Some(if over_cost { "cost budget exceeded" } else { "duration budget exceeded" }),
                    );
                    workers.abort_all();
                    for (id, state) in states.iter_mut() {
                        if matches!(
                            state,
                            TaskState::Running | TaskState::Ready | TaskState::Pending
                                | TaskState::RetryScheduled
                        ) {
                            *state = TaskState::Skipped;
                            push_event(&mut log, "task_cancelled", Some(id), Some("budget"));
                        }
                    }
                    break 'orchestrate;
                }

                let agent = self.assign_agent(definition, spec, &agents)?;
                let prompt = build_task_prompt(spec, &input, &outputs);
                let timeout = Duration::from_secs(spec.timeout_secs);
                let task_name = spec.name.clone();

                states.insert(task_id.clone(), TaskState::Running);
                push_event(&mut log, "task_started", Some(&task_id), None);

                let id = task_id.clone();
                workers.spawn(async move {
                    let result =
                        match tokio::time::timeout(timeout, agent.execute_tagged(&prompt, &task_name))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(HiveError::timeout(format!(
                                "task '{}' exceeded its {}s deadline",
                                id,
                                timeout.as_secs()
                            ))),
                        };
                    WorkerMsg::Finished { task_id: id, result }
                });
            }

            // Done when nothing is in flight and nothing can start.
            if workers.is_empty() {
                break;
            }

            let msg = match workers.join_next().await {
                Some(Ok(msg)) => msg,
                Some(Err(join_err)) => {
                    if join_err.is_cancelled() {
                        continue;
                    }
                    return Err(HiveError::internal(format!(
                        "workflow worker panicked: {}",
                        join_err
                    )));
                }
                None => break,
            };

            match msg {
                WorkerMsg::Finished { task_id, result } => match result {
                    Ok(response) => {
                        states.insert(task_id.clone(), TaskState::Completed);
                        total_tokens += response.total_tokens() as u64;
                        total_cost += response.cost_usd;

                        let output = parse_output(&response.content);
                        outputs.insert(task_id.clone(), output.clone());
                        let spec = &specs[&task_id];
                        results.push(TaskResultEntry {
                            task_id: task_id.clone(),
                            task_name: spec.name.clone(),
                            output,
                        });
                        push_event(&mut log, "task_completed", Some(&task_id), None);
                    }
                    Err(err) => {
                        let attempt = attempts.entry(task_id.clone()).or_insert(0);
                        *attempt += 1;
                        let attempt = *attempt;
                        let spec = &specs[&task_id];

                        // Timeouts retry once; other retriable errors
                        // retry while attempts remain.
                        let may_retry = err.retriable
                            && attempt < spec.max_attempts
                            && !(err.kind == ErrorKind::Timeout && attempt > 1);

                        if may_retry {
                            states.insert(task_id.clone(), TaskState::RetryScheduled);
                            let delay = backoff_delay(self.retry_base, attempt);
                            let detail = format!("attempt {} in {:?}", attempt + 1, delay);
                            push_event(
                                &mut log,
                                "task_retry_scheduled",
                                Some(&task_id),
                                Some(detail.as_str()),
                            );
                            let id = task_id.clone();
                            workers.spawn(async move {
                                tokio::time::sleep(delay).await;
                                WorkerMsg::RetryDue { task_id: id }
                            });
                        } else {
                            states.insert(task_id.clone(), TaskState::Failed);
                            failed_tasks.push(task_id.clone());
                            push_event(
                                &mut log,
                                "task_failed",
                                Some(&task_id),
                                Some(err.message.as_str()),
                            );

                            if definition.policy.on_failure == OnFailure::FailFast {
                                status = WorkflowStatus::Failed;
                                error = Some(format!("task '{}' failed: {}", task_id, err.user_message));
                                workers.abort_all();
                                for (id, state) in states.iter_mut() {
                                    if matches!(
                                        state,
                                        TaskState::Running
                                            | TaskState::Ready
                                            | TaskState::Pending
                                            | TaskState::RetryScheduled
                                    ) {
                                        *state = TaskState::Skipped;
                                        push_event(
                                            &mut log,
                                            "task_skipped",
                                            Some(id),
                                            Some("fail-fast"),
                                        );
                                    }
                                }
                                break 'orchestrate;
                            }
                        }
                    }
                },
                WorkerMsg::RetryDue { task_id } => {
                    if states[&task_id] == TaskState::RetryScheduled {
                        states.insert(task_id.clone(), TaskState::Ready);
                    }
                }
            }
        }

        // Anything still pending can never run (unsatisfiable deps).
        for (id, state) in states.iter_mut() {
            if matches!(state, TaskState::Pending | TaskState::Ready) {
                *state = TaskState::Skipped;
                push_event(&mut log, "task_skipped", Some(id), Some("unreachable"));
            }
        }

        let completed = states.values().filter(|s| **s == TaskState::Completed).count();
        let skipped_tasks: Vec<String> = definition
            .tasks
            .iter()
            .filter(|t| states[&t.id] == TaskState::Skipped)
            .map(|t| t.id.clone())
            .collect();

        if status == WorkflowStatus::Running {
            status = if failed_tasks.is_empty() {
                WorkflowStatus::Completed
            } else {
                WorkflowStatus::Failed
            };
            if status == WorkflowStatus::Failed && error.is_none() {
                error = Some(format!("{} task(s) failed", failed_tasks.len()));
            }
        }
        let status_detail = format!("{:?}", status);
        push_event(&mut log, "workflow_finished", None, Some(status_detail.as_str()));
        tracing::info!(
            execution_id = %execution_id,
            ?status,
            completed,
            failed = failed_tasks.len(),
            total_cost,
            "workflow finished"
        );

        Ok(WorkflowOutcome {
            execution_id,
            workflow_id: definition.id,
            status,
            completed_tasks: completed,
            failed_tasks,
            skipped_tasks,
            results,
            total_tokens,
            total_cost,
            execution_time: started.elapsed().as_secs_f64(),
            log,
            error,
        })
    }

    fn assign_agent(
        &self,
        definition: &WorkflowDefinition,
        spec: &TaskSpec,
        agents: &HashMap<Uuid, Arc<WorkforceAgent>>,
    ) -> HiveResult<Arc<WorkforceAgent>> {
        if let Some(agent_id) = spec.agent_id {
            return agents
                .get(&agent_id)
                .cloned()
                .ok_or_else(|| HiveError::internal("validated agent id missing from team"));
        }
        let role = spec
            .role
            .ok_or_else(|| HiveError::internal("validated task has neither agent nor role"))?;
        definition
            .team
            .iter()
            .find(|p| p.role == role)
            .and_then(|p| agents.get(&p.id).cloned())
            .ok_or_else(|| HiveError::internal("validated role missing from team"))
    }

    /// Cost/latency estimate for the budget check, from the router's
    /// pick for a nominal call.
    fn estimate_call(&self, spec: &TaskSpec) -> (f64, Duration) {
        let requirements = ModelRequirements {
            capabilities: vec![hive_core::ModelCapability::TextGeneration],
            estimated_prompt_tokens: hive_llm::estimate_tokens(&spec.description) + 256,
            max_tokens: 1024,
        };
        match self
            .mil
            .recommend_model(&requirements, &RoutingPolicy::default())
            .ok()
            .and_then(|id| self.mil.registry().get(&id).cloned())
        {
            Some(descriptor) => (
                descriptor.cost_of(requirements.estimated_prompt_tokens, 1024),
                Duration::from_millis(descriptor.avg_latency_ms.unwrap_or(1000.0) as u64),
            ),
            None => (0.0, Duration::from_secs(1)),
        }
    }
}

/// Exponential backoff with jitter: base * 2^(attempt-1), +-20%,
/// capped.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.as_millis() as f64 * 2f64.powi(attempt.saturating_sub(1) as i32);
    let jitter = rand::thread_rng().gen_range(1.0 - retry::JITTER_FRACTION..=1.0 + retry::JITTER_FRACTION);
    let delay_ms = (exp * jitter).min(retry::MAX_DELAY_MS as f64);
    Duration::from_millis(delay_ms as u64)
}

fn push_event(log: &mut Vec<ExecutionEvent>, kind: &str, task_id: Option<&str>, detail: Option<&str>) {
    log.push(ExecutionEvent {
        at: Utc::now(),
        kind: kind.to_string(),
        task_id: task_id.map(str::to_string),
        detail: detail.map(str::to_string),
    });
}

/// Resolve the task's input mapping and render the prompt handed to
/// the agent.
fn build_task_prompt(spec: &TaskSpec, input: &Value, outputs: &HashMap<String, Value>) -> String {
    let mut resolved = serde_json::Map::new();
    for (key, input_ref) in &spec.input {
        let value = match input_ref {
            InputRef::WorkflowInput { key: source } => {
                input.get(source).cloned().unwrap_or(Value::Null)
            }
            InputRef::TaskOutput { task } => outputs.get(task).cloned().unwrap_or(Value::Null),
        };
        resolved.insert(key.clone(), value);
    }

    let mut prompt = spec.description.clone();
    if let Some(criteria) = &spec.success_criteria {
        prompt.push_str(&format!("\n\nSuccess criteria: {}", criteria));
    }
    if !resolved.is_empty() {
        prompt.push_str(&format!(
            "\n\nInputs:\n{}",
            serde_json::to_string_pretty(&Value::Object(resolved)).unwrap_or_default()
        ));
    }
    prompt
}

/// Agent output is structured when it parses as a JSON object,
/// otherwise wrapped.
fn parse_output(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "response": content }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maof::{workflow_for_goal, ExecutionPolicy, TaskSpec, WorkflowDefinition};
    use hive_core::{AgentProfile, AgentRole};
    use hive_llm::testing::ScriptedProvider;
    use hive_llm::{MemorySink, MilBuilder};

    fn mil_with(provider: ScriptedProvider) -> (Arc<ModelIntegrationLayer>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let mil = Arc::new(
            MilBuilder::new()
                .with_provider(Arc::new(provider))
                .with_usage_sink(sink.clone())
                .build(),
        );
        (mil, sink)
    }

    fn executor(mil: Arc<ModelIntegrationLayer>) -> WorkflowExecutor {
        WorkflowExecutor::new(mil).with_retry_base(Duration::from_millis(5))
    }

    fn single_task_workflow() -> WorkflowDefinition {
        let team = vec![AgentProfile::new("solo", AgentRole::Executor)];
        let tasks =
            vec![TaskSpec::new("only", "only", "do the one thing").with_role(AgentRole::Executor)];
        WorkflowDefinition::new("one task", team, tasks)
    }

    #[tokio::test]
    async fn test_template_workflow_completes() {
        let (mil, _) = mil_with(ScriptedProvider::openai_echo());
        let workflow = workflow_for_goal("Research and analyze AI trends", None);
        let outcome = executor(mil).execute(&workflow, json!({})).await.unwrap();

        assert_eq!(outcome.status, WorkflowStatus::Completed);
        assert_eq!(outcome.completed_tasks, 3);
        assert!(outcome.failed_tasks.is_empty());
        assert!(outcome.total_tokens > 0);
        assert!(outcome.total_cost > 0.0);
        // Completion order respects the chain.
        let names: Vec<&str> = outcome.results.iter().map(|r| r.task_name.as_str()).collect();
        assert_eq!(names, vec!["research", "analysis", "report"]);
    }

    #[tokio::test]
    async fn test_single_task_workflow_skips_fan_in() {
        let (mil, _) = mil_with(ScriptedProvider::openai_echo());
        let outcome = executor(mil)
            .execute(&single_task_workflow(), json!({}))
            .await
            .unwrap();

        assert_eq!(outcome.status, WorkflowStatus::Completed);
        assert_eq!(outcome.completed_tasks, 1);
        assert_eq!(outcome.results.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success_records_three_usage_entries() {
        // First two attempts fail with a retriable provider error, the
        // third succeeds.
        let provider = ScriptedProvider::openai_echo()
            .failing_first_n(2, HiveError::provider("transient upstream", true));
        let (mil, sink) = mil_with(provider);

        let team = vec![AgentProfile::new("solo", AgentRole::Executor)];
        let tasks = vec![TaskSpec::new("t", "flaky-task", "do the flaky thing")
            .with_role(AgentRole::Executor)
            .with_max_attempts(3)];
        let workflow = WorkflowDefinition::new("retry test", team, tasks);

        let outcome = executor(mil).execute(&workflow, json!({})).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Completed);

        let attributed: Vec<_> = sink
            .records()
            .into_iter()
            .filter(|r| r.task_type.as_deref() == Some("flaky-task"))
            .collect();
        assert_eq!(attributed.len(), 3);
        assert_eq!(attributed.iter().filter(|r| r.success).count(), 1);
    }

    #[tokio::test]
    async fn test_attempts_exhausted_fails_workflow() {
        let provider = ScriptedProvider::openai_echo()
            .failing_first_n(5, HiveError::provider("transient upstream", true));
        let (mil, _) = mil_with(provider);

        let team = vec![AgentProfile::new("solo", AgentRole::Executor)];
        let tasks = vec![TaskSpec::new("t", "doomed", "never works")
            .with_role(AgentRole::Executor)
            .with_max_attempts(2)];
        let workflow = WorkflowDefinition::new("exhausted", team, tasks);

        let outcome = executor(mil).execute(&workflow, json!({})).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Failed);
        assert_eq!(outcome.failed_tasks, vec!["t".to_string()]);
    }

    #[tokio::test]
    async fn test_non_retriable_failure_does_not_retry() {
        let provider = ScriptedProvider::openai_echo()
            .failing_first_n(1, HiveError::provider("rejected", false));
        let (mil, sink) = mil_with(provider);

        let team = vec![AgentProfile::new("solo", AgentRole::Executor)];
        let tasks = vec![TaskSpec::new("t", "strict", "invalid input")
            .with_role(AgentRole::Executor)
            .with_max_attempts(3)];
        let workflow = WorkflowDefinition::new("no retry", team, tasks);

        let outcome = executor(mil).execute(&workflow, json!({})).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Failed);
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_skips_downstream() {
        let provider = ScriptedProvider::openai_echo()
            .failing_first_n(1, HiveError::provider("down", false));
        let (mil, _) = mil_with(provider);

        let workflow = workflow_for_goal("Research and analyze failures", None);
        let outcome = executor(mil).execute(&workflow, json!({})).await.unwrap();

        assert_eq!(outcome.status, WorkflowStatus::Failed);
        assert_eq!(outcome.failed_tasks, vec!["research".to_string()]);
        assert!(outcome.skipped_tasks.contains(&"analysis".to_string()));
        assert!(outcome.skipped_tasks.contains(&"report".to_string()));
    }

    #[tokio::test]
    async fn test_continue_policy_finishes_independent_branches() {
        let provider = ScriptedProvider::openai_echo()
            .failing_first_n(1, HiveError::provider("down", false));
        let (mil, _) = mil_with(provider);

        // a and b are independent; a fails, b must still complete.
        let team = vec![AgentProfile::new("solo", AgentRole::Executor)];
        let tasks = vec![
            TaskSpec::new("a", "a", "first branch").with_role(AgentRole::Executor),
            TaskSpec::new("b", "b", "second branch").with_role(AgentRole::Executor),
        ];
        let workflow = WorkflowDefinition::new("branches", team, tasks).with_policy(
            ExecutionPolicy {
                on_failure: OnFailure::Continue,
                max_parallel: Some(1),
                ..Default::default()
            },
        );

        let outcome = executor(mil).execute(&workflow, json!({})).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Failed);
        assert_eq!(outcome.completed_tasks, 1);
        assert_eq!(outcome.failed_tasks, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_cost_budget_enforced() {
        let (mil, _) = mil_with(ScriptedProvider::openai_echo());
        let workflow = single_task_workflow().with_policy(ExecutionPolicy {
            max_cost_usd: Some(0.0),
            ..Default::default()
        });

        let outcome = executor(mil).execute(&workflow, json!({})).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("budget_exceeded"));
        assert_eq!(outcome.completed_tasks, 0);
    }

    #[tokio::test]
    async fn test_diamond_scheduling_respects_topology() {
        let (mil, _) = mil_with(ScriptedProvider::openai_echo());

        let team = vec![AgentProfile::new("solo", AgentRole::Executor)];
        let tasks = vec![
            TaskSpec::new("a", "a", "start").with_role(AgentRole::Executor),
            TaskSpec::new("b", "b", "left")
                .with_role(AgentRole::Executor)
                .with_dependencies(vec!["a".to_string()]),
            TaskSpec::new("c", "c", "right")
                .with_role(AgentRole::Executor)
                .with_dependencies(vec!["a".to_string()]),
            TaskSpec::new("d", "d", "join")
                .with_role(AgentRole::Executor)
                .with_dependencies(vec!["b".to_string(), "c".to_string()]),
        ];
        let workflow = WorkflowDefinition::new("diamond", team, tasks);

        let outcome = executor(mil).execute(&workflow, json!({})).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Completed);

        // Start order from the log respects the topological order; the
        // running set is always an antichain because starts only happen
        // after every dependency completed.
        let starts: Vec<&str> = outcome
            .log
            .iter()
            .filter(|e| e.kind == "task_started")
            .filter_map(|e| e.task_id.as_deref())
            .collect();
        assert_eq!(starts[0], "a");
        assert_eq!(starts[3], "d");
        let completes: Vec<&str> = outcome
            .log
            .iter()
            .filter(|e| e.kind == "task_completed")
            .filter_map(|e| e.task_id.as_deref())
            .collect();
        let a_done = outcome
            .log
            .iter()
            .position(|e| e.kind == "task_completed" && e.task_id.as_deref() == Some("a"))
            .unwrap();
        let b_start = outcome
            .log
            .iter()
            .position(|e| e.kind == "task_started" && e.task_id.as_deref() == Some("b"))
            .unwrap();
        assert!(a_done < b_start);
        assert_eq!(completes.last(), Some(&"d"));
    }

    #[tokio::test]
    async fn test_input_mapping_reaches_downstream_prompt() {
        let (mil, _) = mil_with(ScriptedProvider::openai_echo());

        let team = vec![AgentProfile::new("solo", AgentRole::Executor)];
        let tasks = vec![
            TaskSpec::new("a", "a", "produce a value").with_role(AgentRole::Executor),
            TaskSpec::new("b", "b", "consume the value")
                .with_role(AgentRole::Executor)
                .with_dependencies(vec!["a".to_string()])
                .with_input("upstream", InputRef::TaskOutput { task: "a".to_string() })
                .with_input("topic", InputRef::WorkflowInput { key: "topic".to_string() }),
        ];
        let workflow = WorkflowDefinition::new("mapping", team, tasks);

        let outcome = executor(mil)
            .execute(&workflow, json!({"topic": "observability"}))
            .await
            .unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Completed);

        // The echo provider reflects the prompt, so b's output must
        // mention both mapped inputs.
        let b_output = outcome.result_of("b").unwrap();
        let text = b_output["response"].as_str().unwrap();
        assert!(text.contains("observability"));
        assert!(text.contains("produce a value"));
    }

    #[test]
    fn test_backoff_delay_bounds() {
        let base = Duration::from_millis(1000);
        for attempt in 1..=10 {
            let delay = backoff_delay(base, attempt);
            assert!(delay <= Duration::from_millis(retry::MAX_DELAY_MS + retry::MAX_DELAY_MS / 5));
        }
        // First attempt stays near the base.
        let first = backoff_delay(base, 1);
        assert!(first >= Duration::from_millis(800) && first <= Duration::from_millis(1200));
    }

    #[test]
    fn test_parse_output() {
        assert_eq!(parse_output(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(parse_output("plain text"), json!({"response": "plain text"}));
        assert_eq!(parse_output("[1, 2]"), json!({"response": "[1, 2]"}));
    }
}
