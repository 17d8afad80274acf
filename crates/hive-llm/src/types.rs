//! Normalized request/response types for the provider gateway

use hive_core::ModelCapability;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Message role in a structured conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message in a structured request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Tool exposed to the model via function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool parameters
    pub parameters: serde_json::Value,
}

/// Normalized LLM request. Providers translate this into their own wire
/// format; nothing vendor-specific appears here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Prompt text; ignored when `messages` is set
    pub prompt: String,

    /// Structured conversation, preferred over `prompt` when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,

    /// Pinned target model; None lets the router choose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    /// Output token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// System prompt prepended by the provider adapter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Tools exposed via function calling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Request streamed delivery where the vendor supports it
    #[serde(default)]
    pub stream: bool,

    /// Capabilities the selected model must declare
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_capabilities: Vec<ModelCapability>,

    /// Caller tag recorded in usage entries (e.g. "synthesis")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,

    /// Caller identity recorded in usage entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Caller-supplied idempotency id
    pub idempotency_id: String,

    /// Free-form request metadata carried into usage records
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

impl LlmRequest {
    /// Plain-text request with defaults.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            messages: None,
            model_id: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: None,
            tools: None,
            stream: false,
            required_capabilities: Vec::new(),
            task_type: None,
            user_id: None,
            idempotency_id: Uuid::new_v4().to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<ModelCapability>) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    /// Canonical text used for fingerprinting: the structured messages
    /// when present, the trimmed prompt otherwise.
    pub fn canonical_text(&self) -> String {
        match &self.messages {
            Some(messages) => {
                serde_json::to_string(messages).unwrap_or_else(|_| self.prompt.trim().to_string())
            }
            None => self.prompt.trim().to_string(),
        }
    }

    /// Stable signature of the exposed tool set, part of the cache key.
    pub fn tools_signature(&self) -> String {
        match &self.tools {
            Some(tools) => {
                let mut names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
                names.sort_unstable();
                names.join(",")
            }
            None => String::new(),
        }
    }

    /// Byte-based prompt size estimate used for routing and admission.
    pub fn estimated_prompt_tokens(&self) -> u32 {
        let mut bytes = self.canonical_text().len();
        if let Some(system) = &self.system_prompt {
            bytes += system.len();
        }
        crate::provider::estimate_tokens_from_bytes(bytes)
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Cancelled,
    Other,
}

/// Normalized LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated content
    pub content: String,

    /// Model that actually served the request
    pub model_used: String,

    /// Provider that served the request
    pub provider: String,

    /// Input token count (vendor-reported or estimated)
    pub input_tokens: u32,

    /// Output token count (vendor-reported or estimated)
    pub output_tokens: u32,

    /// Cost in USD at the descriptor prices active at call time
    pub cost_usd: f64,

    /// Wall-clock latency in milliseconds
    pub latency_ms: f64,

    /// Why generation stopped
    pub finish_reason: FinishReason,

    /// Whether this response was served from the cache
    #[serde(default)]
    pub was_cached: bool,
}

impl LlmResponse {
    /// Total token count.
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}
