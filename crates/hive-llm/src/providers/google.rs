//! Google Gemini generateContent adapter

use async_trait::async_trait;
use hive_core::{HiveError, HiveResult, ModelDescriptor};
use serde_json::{json, Value};
use std::time::Instant;

use crate::provider::{
    classify_http_failure, classify_transport_failure, estimate_tokens, LlmProvider,
};
use crate::providers::catalog;
use crate::types::{FinishReason, LlmRequest, LlmResponse, MessageRole};

/// Adapter for generativelanguage.googleapis.com.
pub struct GoogleProvider {
    base_url: String,
    api_key: String,
    models: Vec<ModelDescriptor>,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: api_key.into(),
            models: catalog::google_models(),
            http: reqwest::Client::new(),
        }
    }

    fn descriptor(&self, model_id: &str) -> HiveResult<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == model_id).ok_or_else(|| {
            HiveError::not_found(format!(
                "Model '{}' is not served by provider 'google'",
                model_id
            ))
        })
    }

    /// Build the generateContent request body. Gemini keeps the system
    /// prompt in `systemInstruction` and uses "model" for assistant
    /// turns.
    fn build_body(req: &LlmRequest) -> Value {
        let mut contents: Vec<Value> = Vec::new();
        match &req.messages {
            Some(structured) => {
                for msg in structured {
                    let role = match msg.role {
                        MessageRole::System => continue,
                        MessageRole::User => "user",
                        MessageRole::Assistant => "model",
                    };
                    contents.push(json!({"role": role, "parts": [{"text": msg.content}]}));
                }
            }
            None => contents.push(json!({"role": "user", "parts": [{"text": req.prompt}]})),
        }
        if contents.is_empty() {
            contents.push(json!({"role": "user", "parts": [{"text": req.prompt}]}));
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": req.max_tokens,
                "temperature": req.temperature,
            }
        });
        if let Some(system) = &req.system_prompt {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
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
        let candidate = body
            .get("candidates")
            .and_then(|c| c.get(0))
            .ok_or_else(|| {
                HiveError::provider("google response had no candidates", false)
                    .with_code("malformed_response")
            })?;

        let content = candidate
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let finish_reason = match candidate.get("finishReason").and_then(Value::as_str) {
            Some("STOP") => FinishReason::Stop,
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("PROHIBITED_CONTENT") => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        };

        let input_tokens = body
            .pointer("/usageMetadata/promptTokenCount")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or_else(|| req.estimated_prompt_tokens());
        let output_tokens = body
            .pointer("/usageMetadata/candidatesTokenCount")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or_else(|| estimate_tokens(&content));

        Ok(LlmResponse {
            content,
            model_used: descriptor.id.clone(),
            provider: "google".to_string(),
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
impl LlmProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
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

        let body = Self::build_body(req);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model_id, self.api_key
        );
        tracing::debug!(provider = "google", model = %model_id, "dispatching generation");

        let started = Instant::now();
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_failure("google", &e))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_failure("google", &e))?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if !(200..300).contains(&status) {
            return Err(classify_http_failure("google", status, &text));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            HiveError::provider(format!("google returned invalid JSON: {}", e), false)
                .with_code("malformed_response")
        })?;

        self.parse_body(req, &parsed, &descriptor, latency_ms)
    }
}
