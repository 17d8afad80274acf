//! Multi-Agent Orchestration Framework
//!
//! Workflow definitions are a DAG of tasks assigned to role-specialized
//! team members, executed under a policy with per-task retry, timeouts,
//! and workflow-level budget accounting.

pub mod executor;

pub use executor::{
    ExecutionEvent, TaskResultEntry, WorkflowExecutor, WorkflowOutcome, WorkflowStatus,
};

use hive_core::{constants::timeouts, AgentProfile, AgentRole, HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// What to do with the rest of the workflow when a task fails
/// terminally.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Cancel running siblings and skip everything downstream
    #[default]
    FailFast,
    /// Let independent branches finish
    Continue,
}

/// Workflow-level execution policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    /// Concurrent task cap; defaults to min(team size, 4)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    #[serde(default)]
    pub on_failure: OnFailure,

    /// Workflow budget in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,

    /// Workflow wall-clock ceiling in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_secs: Option<u64>,

    /// Gate execution behind human approval (handled by the caller)
    #[serde(default)]
    pub require_human_approval: bool,
}

/// Where a task input value comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum InputRef {
    /// Key of the workflow input payload
    WorkflowInput { key: String },
    /// Output of an upstream task
    TaskOutput { task: String },
}

/// One task node in the DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique id within the workflow
    pub id: String,

    /// Display name, also the usage-attribution tag
    pub name: String,

    /// What the assigned agent is asked to do
    pub description: String,

    /// Explicit assignee; when absent, `role` picks a team member
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,

    /// Role to auto-assign from the team
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<AgentRole>,

    /// Input mapping resolved at dispatch time
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub input: HashMap<String, InputRef>,

    /// Free-form success criteria passed to the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<String>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_task_timeout")]
    pub timeout_secs: u64,

    /// Ids of tasks that must complete first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_task_timeout() -> u64 {
    timeouts::WORKFLOW_TASK_SECS
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            agent_id: None,
            role: None,
            input: HashMap::new(),
            success_criteria: None,
            max_attempts: default_max_attempts(),
            timeout_secs: default_task_timeout(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, input_ref: InputRef) -> Self {
        self.input.insert(key.into(), input_ref);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// A workflow: goal, team, DAG, and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub goal: String,
    pub team: Vec<AgentProfile>,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub policy: ExecutionPolicy,
}

impl WorkflowDefinition {
    pub fn new(goal: impl Into<String>, team: Vec<AgentProfile>, tasks: Vec<TaskSpec>) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal: goal.into(),
            team,
            tasks,
            policy: ExecutionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parse a workflow definition from YAML and validate it.
    pub fn from_yaml(yaml: &str) -> HiveResult<Self> {
        let definition: Self = serde_yaml::from_str(yaml)
            .map_err(|e| HiveError::validation(format!("Failed to parse workflow YAML: {}", e)))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Structural validation: unique task ids, dependencies exist, the
    /// DAG is acyclic, and every referenced role or agent is on the
    /// team.
    pub fn validate(&self) -> HiveResult<()> {
        if self.tasks.is_empty() {
            return Err(HiveError::validation("workflow has no tasks"));
        }
        if self.team.is_empty() {
            return Err(HiveError::validation("workflow has no team"));
        }

        let mut ids = HashSet::new();
        for task in &self.tasks {
            if !ids.insert(task.id.as_str()) {
                return Err(HiveError::validation(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }
        for task in &self.tasks {
            for dep in &task.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(HiveError::validation(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.id, dep
                    )));
                }
            }
            for input_ref in task.input.values() {
                if let InputRef::TaskOutput { task: source } = input_ref {
                    if !ids.contains(source.as_str()) {
                        return Err(HiveError::validation(format!(
                            "task '{}' reads output of unknown task '{}'",
                            task.id, source
                        )));
                    }
                }
            }
        }

        self.check_acyclic()?;

        let team_roles: HashSet<AgentRole> = self.team.iter().map(|a| a.role).collect();
        let team_ids: HashSet<Uuid> = self.team.iter().map(|a| a.id).collect();
        for task in &self.tasks {
            match (task.agent_id, task.role) {
                (Some(agent_id), _) => {
                    if !team_ids.contains(&agent_id) {
                        return Err(HiveError::validation(format!(
                            "task '{}' is assigned to an agent outside the team",
                            task.id
                        )));
                    }
                }
                (None, Some(role)) => {
                    if !team_roles.contains(&role) {
                        return Err(HiveError::validation(format!(
                            "task '{}' needs role '{}' which no team member covers",
                            task.id,
                            role.as_str()
                        )));
                    }
                }
                (None, None) => {
                    return Err(HiveError::validation(format!(
                        "task '{}' has neither an agent nor a role",
                        task.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Kahn's algorithm; leftovers mean a cycle.
    fn check_acyclic(&self) -> HiveResult<()> {
        let mut in_degree: HashMap<&str, usize> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.depends_on.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in &self.tasks {
            for dep in &task.depends_on {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(task.id.as_str());
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            if let Some(children) = dependents.get(id) {
                for &child in children {
                    let degree = in_degree.get_mut(child).expect("child is a task");
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
        if visited != self.tasks.len() {
            return Err(HiveError::validation("workflow DAG contains a cycle"));
        }
        Ok(())
    }
}

/// Named workflow templates, matched against the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowTemplate {
    ResearchAnalysis,
    CodeDevelopment,
}

impl WorkflowTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowTemplate::ResearchAnalysis => "research_analysis",
            WorkflowTemplate::CodeDevelopment => "code_development",
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "research_analysis" => Some(WorkflowTemplate::ResearchAnalysis),
            "code_development" => Some(WorkflowTemplate::CodeDevelopment),
            _ => None,
        }
    }

    /// Detect a template from goal keywords.
    pub fn detect(goal: &str) -> Option<Self> {
        let lowered = goal.to_lowercase();
        if lowered.contains("research") || lowered.contains("analy") {
            Some(WorkflowTemplate::ResearchAnalysis)
        } else if lowered.contains("code") || lowered.contains("develop") || lowered.contains("script")
        {
            Some(WorkflowTemplate::CodeDevelopment)
        } else {
            None
        }
    }
}

/// Build a workflow for a goal: a matching template when one applies,
/// the minimal plan/execute/review DAG otherwise.
pub fn workflow_for_goal(goal: &str, template_name: Option<&str>) -> WorkflowDefinition {
    let template = match template_name {
        Some(name) => WorkflowTemplate::by_name(name),
        None => WorkflowTemplate::detect(goal),
    };

    match template {
        Some(WorkflowTemplate::ResearchAnalysis) => research_analysis_workflow(goal),
        Some(WorkflowTemplate::CodeDevelopment) => code_development_workflow(goal),
        None => dynamic_workflow(goal),
    }
}

fn research_analysis_workflow(goal: &str) -> WorkflowDefinition {
    let team = vec![
        AgentProfile::new("researcher", AgentRole::Researcher),
        AgentProfile::new("analyst", AgentRole::Analyst),
        AgentProfile::new("writer", AgentRole::Writer),
    ];
    let tasks = vec![
        TaskSpec::new("research", "research", format!("Gather information relevant to: {}", goal))
            .with_role(AgentRole::Researcher),
        TaskSpec::new("analysis", "analysis", format!("Analyze the research findings for: {}", goal))
            .with_role(AgentRole::Analyst)
            .with_dependencies(vec!["research".to_string()])
            .with_input("findings", InputRef::TaskOutput { task: "research".to_string() }),
        TaskSpec::new("report", "report", format!("Write the final report for: {}", goal))
            .with_role(AgentRole::Writer)
            .with_dependencies(vec!["analysis".to_string()])
            .with_input("analysis", InputRef::TaskOutput { task: "analysis".to_string() }),
    ];
    WorkflowDefinition::new(goal, team, tasks)
}

fn code_development_workflow(goal: &str) -> WorkflowDefinition {
    let team = vec![
        AgentProfile::new("planner", AgentRole::Planner),
        AgentProfile::new("coder", AgentRole::Coder),
        AgentProfile::new("reviewer", AgentRole::Reviewer),
    ];
    let tasks = vec![
        TaskSpec::new("plan", "plan", format!("Plan the implementation of: {}", goal))
            .with_role(AgentRole::Planner),
        TaskSpec::new("implement", "implement", format!("Implement: {}", goal))
            .with_role(AgentRole::Coder)
            .with_dependencies(vec!["plan".to_string()])
            .with_input("plan", InputRef::TaskOutput { task: "plan".to_string() }),
        TaskSpec::new("review", "review", "Review the implementation for correctness and style")
            .with_role(AgentRole::Reviewer)
            .with_dependencies(vec!["implement".to_string()])
            .with_input("code", InputRef::TaskOutput { task: "implement".to_string() }),
    ];
    WorkflowDefinition::new(goal, team, tasks)
}

fn dynamic_workflow(goal: &str) -> WorkflowDefinition {
    let team = vec![
        AgentProfile::new("planner", AgentRole::Planner),
        AgentProfile::new("executor", AgentRole::Executor),
        AgentProfile::new("reviewer", AgentRole::Reviewer),
    ];
    let tasks = vec![
        TaskSpec::new("plan", "plan", format!("Break down the goal into steps: {}", goal))
            .with_role(AgentRole::Planner),
        TaskSpec::new("execute", "execute", format!("Execute the plan for: {}", goal))
            .with_role(AgentRole::Executor)
            .with_dependencies(vec!["plan".to_string()])
            .with_input("plan", InputRef::TaskOutput { task: "plan".to_string() }),
        TaskSpec::new("review", "review", "Review the outcome against the goal")
            .with_role(AgentRole::Reviewer)
            .with_dependencies(vec!["execute".to_string()])
            .with_input("outcome", InputRef::TaskOutput { task: "execute".to_string() }),
    ];
    WorkflowDefinition::new(goal, team, tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_templates() {
        for goal in ["research AI trends", "develop a script", "do something else"] {
            let workflow = workflow_for_goal(goal, None);
            workflow.validate().unwrap();
        }
    }

    #[test]
    fn test_template_detection() {
        assert_eq!(
            WorkflowTemplate::detect("Research and analyze AI trends"),
            Some(WorkflowTemplate::ResearchAnalysis)
        );
        assert_eq!(
            WorkflowTemplate::detect("Develop a Python script"),
            Some(WorkflowTemplate::CodeDevelopment)
        );
        assert_eq!(WorkflowTemplate::detect("Plan the offsite"), None);
    }

    #[test]
    fn test_dynamic_workflow_shape() {
        let workflow = workflow_for_goal("something unusual", None);
        let ids: Vec<&str> = workflow.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["plan", "execute", "review"]);
        let roles: Vec<AgentRole> = workflow.team.iter().map(|a| a.role).collect();
        assert_eq!(
            roles,
            vec![AgentRole::Planner, AgentRole::Executor, AgentRole::Reviewer]
        );
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let team = vec![AgentProfile::new("a", AgentRole::Executor)];
        let tasks = vec![TaskSpec::new("t1", "t1", "work")
            .with_role(AgentRole::Executor)
            .with_dependencies(vec!["ghost".to_string()])];
        let err = WorkflowDefinition::new("g", team, tasks).validate().unwrap_err();
        assert_eq!(err.kind, hive_core::ErrorKind::Validation);
        assert!(err.message.contains("ghost"));
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let team = vec![AgentProfile::new("a", AgentRole::Executor)];
        let tasks = vec![
            TaskSpec::new("t1", "t1", "x")
                .with_role(AgentRole::Executor)
                .with_dependencies(vec!["t2".to_string()]),
            TaskSpec::new("t2", "t2", "y")
                .with_role(AgentRole::Executor)
                .with_dependencies(vec!["t1".to_string()]),
        ];
        let err = WorkflowDefinition::new("g", team, tasks).validate().unwrap_err();
        assert!(err.message.contains("cycle"));
    }

    #[test]
    fn test_validate_rejects_uncovered_role() {
        let team = vec![AgentProfile::new("a", AgentRole::Executor)];
        let tasks = vec![TaskSpec::new("t1", "t1", "x").with_role(AgentRole::Coder)];
        let err = WorkflowDefinition::new("g", team, tasks).validate().unwrap_err();
        assert!(err.message.contains("coder"));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let team = vec![AgentProfile::new("a", AgentRole::Executor)];
        let tasks = vec![
            TaskSpec::new("t1", "a", "x").with_role(AgentRole::Executor),
            TaskSpec::new("t1", "b", "y").with_role(AgentRole::Executor),
        ];
        let err = WorkflowDefinition::new("g", team, tasks).validate().unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn test_validate_rejects_foreign_agent() {
        let team = vec![AgentProfile::new("a", AgentRole::Executor)];
        let mut task = TaskSpec::new("t1", "t1", "x");
        task.agent_id = Some(Uuid::new_v4());
        let err = WorkflowDefinition::new("g", team, vec![task]).validate().unwrap_err();
        assert!(err.message.contains("outside the team"));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
id: 6f3a2c1e-6f4b-4e2e-9a43-2f62a6a2b111
goal: summarize the incident report
team:
  - id: 4dfc1a36-9d0a-4f9e-8a57-02f3b8f6a001
    name: summarizer
    role: writer
    system_prompt: You summarize incident reports.
    created_at: 2025-07-01T00:00:00Z
tasks:
  - id: summarize
    name: summarize
    description: Summarize the report
    role: writer
policy:
  on_failure: continue
"#;
        let workflow = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(workflow.tasks.len(), 1);
        assert_eq!(workflow.policy.on_failure, OnFailure::Continue);

        assert!(WorkflowDefinition::from_yaml("goal: broken").is_err());
    }

    #[test]
    fn test_input_ref_serde() {
        let json = serde_json::to_value(InputRef::TaskOutput { task: "research".into() }).unwrap();
        assert_eq!(json["from"], "task_output");
        let parsed: InputRef =
            serde_json::from_value(serde_json::json!({"from": "workflow_input", "key": "topic"}))
                .unwrap();
        assert_eq!(parsed, InputRef::WorkflowInput { key: "topic".into() });
    }
}
