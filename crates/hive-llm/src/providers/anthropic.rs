//! Anthropic messages-API adapter

use async_trait::async_trait;
use hive_core::{HiveError, HiveResult, ModelDescriptor};
use serde_json::{json, Value};
use std::time::Instant;

use crate::provider::{
    classify_http_failure, classify_transport_failure, estimate_tokens, LlmProvider,
};
use crate::providers::catalog;
use crate::types::{FinishReason, LlmRequest, LlmResponse, MessageRole};

const API_VERSION: &str = "2023-06-01";

/// Adapter for api.anthropic.com.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    models: Vec<ModelDescriptor>,
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1".to_string(),
            api_key: api_key.into(),
            models: catalog::anthropic_models(),
            http: reqwest::Client::new(),
        }
    }

    fn descriptor(&self, model_id: &str) -> HiveResult<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == model_id).ok_or_else(|| {
            HiveError::not_found(format!(
                "Model '{}' is not served by provider 'anthropic'",
                model_id
            ))
        })
    }

    /// Build the messages-API request body. The system prompt rides in
    /// the top-level `system` field, not the message list.
    fn build_body(req: &LlmRequest, model_id: &str) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        match &req.messages {
            Some(structured) => {
                for msg in structured {
                    match msg.role {
                        // System turns fold into the system field below.
                        MessageRole::System => continue,
                        MessageRole::User => {
                            messages.push(json!({"role": "user", "content": msg.content}))
                        }
                        MessageRole::Assistant => {
                            messages.push(json!({"role": "assistant", "content": msg.content}))
                        }
                    }
                }
            }
            None => messages.push(json!({"role": "user", "content": req.prompt})),
        }
        if messages.is_empty() {
            messages.push(json!({"role": "user", "content": req.prompt}));
        }

        let mut body = json!({
            "model": model_id,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        let mut system_parts: Vec<&str> = Vec::new();
        if let Some(system) = &req.system_prompt {
            system_parts.push(system);
        }
        if let Some(structured) = &req.messages {
            for msg in structured {
                if msg.role == MessageRole::System {
                    system_parts.push(&msg.content);
                }
            }
        }
        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }

        if let Some(tools) = &req.tools {
            let tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }

    fn parse_body(
        &self,
        req: &LlmRequest,
        body: &Value,
        descriptor: &ModelDescriptor,
        latency_ms: f64,
    ) -> HiveResult<LlmResponse> {
        let content = body
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let finish_reason = match body.get("stop_reason").and_then(Value::as_str) {
            Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            Some("tool_use") => FinishReason::ToolUse,
            _ => FinishReason::Other,
        };

        let input_tokens = body
            .pointer("/usage/input_tokens")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or_else(|| req.estimated_prompt_tokens());
        let output_tokens = body
            .pointer("/usage/output_tokens")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or_else(|| estimate_tokens(&content));

        Ok(LlmResponse {
            content,
            model_used: descriptor.id.clone(),
            provider: "anthropic".to_string(),
            input_tokens,
            output_tokens,
            cost_usd: descriptor.cost_of(input_tokens, output_tokens),
            latency_ms,
            finish_reason,
            was_cached: false,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<ModelDescriptor> {
        self.models.clone()
    }

    async fn generate(&self, req: &LlmRequest) -> HiveResult<LlmResponse> {
        let model_id = req
            .model_id
            .as_deref()
            .ok_or_else(|| HiveError::validation("request reached provider without a model id"))?;
        let descriptor = self.descriptor(model_id)?.clone();

        let body = Self::build_body(req, model_id);
        let url = format!("{}/messages", self.base_url);
        tracing::debug!(provider = "anthropic", model = %model_id, "dispatching generation");

        let started = Instant::now();
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_failure("anthropic", &e))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_failure("anthropic", &e))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !(200..300).contains(&status) {
            return Err(classify_http_failure("anthropic", status, &text));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            HiveError::provider(format!("anthropic returned invalid JSON: {}", e), false)
                .with_code("malformed_response")
        })?;

        self.parse_body(req, &parsed, &descriptor, latency_ms)
    }
}
