//! OpenAI-style chat-completions adapter
//!
//! The same wire format is spoken by several vendors; this adapter is
//! parameterized by provider name, base URL, and catalog, and the
//! compat module instantiates it for each of them.

use async_trait::async_trait;
use hive_core::{HiveError, HiveResult, ModelDescriptor};
use serde_json::{json, Value};
use std::time::Instant;

use crate::provider::{
    classify_http_failure, classify_transport_failure, estimate_tokens, LlmProvider,
};
use crate::providers::catalog;
use crate::types::{FinishReason, LlmRequest, LlmResponse, MessageRole};

/// Adapter for the OpenAI chat-completions wire format.
pub struct OpenAiChatProvider {
    provider_name: String,
    base_url: String,
    api_key: String,
    models: Vec<ModelDescriptor>,
    http: reqwest::Client,
}

impl OpenAiChatProvider {
    /// Adapter for api.openai.com.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            catalog::openai_models(),
        )
    }

    /// Adapter for any vendor speaking the same wire format.
    pub fn with_endpoint(
        provider_name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        models: Vec<ModelDescriptor>,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            models,
            http: reqwest::Client::new(),
        }
    }

    fn descriptor(&self, model_id: &str) -> HiveResult<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == model_id).ok_or_else(|| {
            HiveError::not_found(format!(
                "Model '{}' is not served by provider '{}'",
                model_id, self.provider_name
            ))
        })
    }

    /// Build the chat-completions request body.
    fn build_body(req: &LlmRequest, model_id: &str) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        if let Some(system) = &req.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        match &req.messages {
            Some(structured) => {
                for msg in structured {
                    let role = match msg.role {
                        MessageRole::System => "system",
                        MessageRole::User => "user",
                        MessageRole::Assistant => "assistant",
                    };
                    messages.push(json!({"role": role, "content": msg.content}));
                }
            }
            None => messages.push(json!({"role": "user", "content": req.prompt})),
        }

        let mut body = json!({
            "model": model_id,
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });
        if let Some(tools) = &req.tools {
            let tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }

    /// Parse a chat-completions response into the normalized form.
    fn parse_body(
        &self,
        req: &LlmRequest,
        body: &Value,
        descriptor: &ModelDescriptor,
        latency_ms: f64,
    ) -> HiveResult<LlmResponse> {
        let choice = body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| {
                HiveError::provider(
                    format!("{} response had no choices", self.provider_name),
                    false,
                )
                .with_code("malformed_response")
            })?;

        let content = choice
            .pointer("/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let finish_reason = match choice.get("finish_reason").and_then(Value::as_str) {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") | Some("function_call") => FinishReason::ToolUse,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        };

        // Usage is best-effort: fall back to the byte estimator when the
        // vendor omits it.
        let input_tokens = body
            .pointer("/usage/prompt_tokens")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or_else(|| req.estimated_prompt_tokens());
        let output_tokens = body
            .pointer("/usage/completion_tokens")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or_else(|| estimate_tokens(&content));

        Ok(LlmResponse {
            content,
            model_used: descriptor.id.clone(),
            provider: self.provider_name.clone(),
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
impl LlmProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        &self.provider_name
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
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(provider = %self.provider_name, model = %model_id, "dispatching generation");

        let started = Instant::now();
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_failure(&self.provider_name, &e))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_failure(&self.provider_name, &e))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !(200..300).contains(&status) {
            return Err(classify_http_failure(&self.provider_name, status, &text));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            HiveError::provider(
                format!("{} returned invalid JSON: {}", self.provider_name, e),
                false,
            )
            .with_code("malformed_response")
        })?;

        self.parse_body(req, &parsed, &descriptor, latency_ms)
    }
}
