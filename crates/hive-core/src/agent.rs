//! Agent profiles and rolling execution statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role tags for specialized agents. Orchestrators auto-assign tasks to
/// team members by role when no explicit agent is named.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Researcher,
    Analyst,
    Writer,
    Coder,
    Reviewer,
    Planner,
    Executor,
    Coordinator,
    Validator,
}

impl AgentRole {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Researcher => "researcher",
            AgentRole::Analyst => "analyst",
            AgentRole::Writer => "writer",
            AgentRole::Coder => "coder",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Planner => "planner",
            AgentRole::Executor => "executor",
            AgentRole::Coordinator => "coordinator",
            AgentRole::Validator => "validator",
        }
    }
}

/// Agent lifecycle status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    Error,
    Disabled,
}

/// Rolling per-agent counters. Latency is kept as a running mean so the
/// profile stays O(1) regardless of execution count.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentStats {
    /// Completed executions
    pub executions: u64,
    /// Total tokens across all executions
    pub total_tokens: u64,
    /// Running mean latency in milliseconds
    pub avg_latency_ms: f64,
}

impl AgentStats {
    /// Fold one execution into the rolling counters.
    pub fn observe(&mut self, tokens: u64, latency_ms: f64) {
        let n = self.executions as f64;
        self.avg_latency_ms = (self.avg_latency_ms * n + latency_ms) / (n + 1.0);
        self.executions += 1;
        self.total_tokens += tokens;
    }
}

/// Configuration and identity of one workforce agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Stable identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Role tag
    pub role: AgentRole,

    /// System prompt prepended to every call
    pub system_prompt: String,

    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Default max output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Lifecycle status
    #[serde(default)]
    pub status: AgentStatus,

    /// Rolling counters
    #[serde(default)]
    pub stats: AgentStats,

    /// Owning user, when created through the API surface
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

impl AgentProfile {
    /// Create a profile with defaults for the given role.
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            system_prompt: format!(
                "You are {}, a specialized {} agent. Be precise and grounded.",
                name,
                role.as_str()
            ),
            name,
            role,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            status: AgentStatus::default(),
            stats: AgentStats::default(),
            created_by: None,
            created_at: Utc::now(),
        }
    }

    /// Override the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the output token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}
