//! Deterministic scripted provider for tests
//!
//! Serves the shipped openai catalog with responses derived only from
//! the request, so orchestrator tests are reproducible without network
//! access.

use async_trait::async_trait;
use hive_core::{HiveError, HiveResult, ModelDescriptor};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::provider::{estimate_tokens, LlmProvider};
use crate::providers::catalog;
use crate::types::{FinishReason, LlmRequest, LlmResponse};

/// Shared call counter exposed to assertions.
#[derive(Debug, Clone, Default)]
pub struct CallCount(Arc<AtomicU32>);

impl CallCount {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

type ResponseFn = dyn Fn(&LlmRequest) -> String + Send + Sync;

/// Provider whose behavior is scripted by the test.
pub struct ScriptedProvider {
    name: String,
    models: Vec<ModelDescriptor>,
    respond: Arc<ResponseFn>,
    delay: Option<Duration>,
    failures: Mutex<Vec<HiveError>>,
    calls: CallCount,
}

impl ScriptedProvider {
    /// Openai-catalog provider that echoes the prompt.
    pub fn openai_echo() -> Self {
        Self::new("openai", catalog::openai_models(), |req: &LlmRequest| {
            format!("echo: {}", req.canonical_text())
        })
    }

    /// Provider with an arbitrary response function.
    pub fn new(
        name: impl Into<String>,
        models: Vec<ModelDescriptor>,
        respond: impl Fn(&LlmRequest) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            models,
            respond: Arc::new(respond),
            delay: None,
            failures: Mutex::new(Vec::new()),
            calls: CallCount::default(),
        }
    }

    /// Sleep this long before answering, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the first `n` calls with clones of the given error.
    pub fn failing_first_n(self, n: usize, err: HiveError) -> Self {
        *self.failures.lock() = vec![err; n];
        self
    }

    /// Handle for asserting how many calls reached the vendor.
    pub fn call_count_handle(&self) -> CallCount {
        self.calls.clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<ModelDescriptor> {
        self.models.clone()
    }

    async fn generate(&self, req: &LlmRequest) -> HiveResult<LlmResponse> {
        self.calls.increment();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.lock().pop() {
            return Err(err);
        }

        let model_id = req.model_id.clone().unwrap_or_default();
        let descriptor = self
            .models
            .iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| HiveError::not_found(format!("scripted model '{}'", model_id)))?;

        let content = (self.respond)(req);
        let input_tokens = req.estimated_prompt_tokens();
        let output_tokens = estimate_tokens(&content);
        Ok(LlmResponse {
            content,
            model_used: descriptor.id.clone(),
            provider: self.name.clone(),
            input_tokens,
            output_tokens,
            cost_usd: descriptor.cost_of(input_tokens, output_tokens),
            latency_ms: self.delay.map(|d| d.as_millis() as f64).unwrap_or(5.0),
            finish_reason: FinishReason::Stop,
            was_cached: false,
        })
    }
}
