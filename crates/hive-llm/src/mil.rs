//! Model Integration Layer
//!
//! The single path from agent code to an LLM vendor. One `generate`
//! call walks: model resolution, cache lookup (single-flight), rate and
//! spend admission, provider dispatch under a deadline, spend
//! settlement, usage recording, and performance feedback for the
//! router.

use hive_core::{
    system_clock, ClockRef, HiveError, HiveResult, ModelDescriptor, ModelFilter, ModelRegistry,
    Settings,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{fingerprint, Acquire, ResponseCache};
use crate::limiter::{LimiterConfig, RateSpendLimiter};
use crate::provider::ProviderRef;
use crate::providers::{catalog, compat, AnthropicProvider, GoogleProvider, OpenAiChatProvider};
use crate::routing::{
    self, recommend_model, ModelRequirements, PerformanceHistory, PerformanceHistoryRef,
    RoutingPolicy,
};
use crate::types::{LlmRequest, LlmResponse};
use crate::usage::{TracingSink, UsageRecord, UsageSinkRef};

/// Builder for [`ModelIntegrationLayer`].
pub struct MilBuilder {
    providers: HashMap<String, ProviderRef>,
    registry_version: String,
    clock: ClockRef,
    cache_ttl: Duration,
    limiter_config: LimiterConfig,
    sink: UsageSinkRef,
    default_policy: RoutingPolicy,
    provider_timeout: Duration,
}

impl MilBuilder {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            registry_version: catalog::CATALOG_VERSION.to_string(),
            clock: system_clock(),
            cache_ttl: Duration::from_secs(hive_core::constants::cache::TTL_SECS),
            limiter_config: LimiterConfig::from_requests_per_minute(60),
            sink: Arc::new(TracingSink),
            default_policy: RoutingPolicy::default(),
            provider_timeout: Duration::from_secs(
                hive_core::constants::timeouts::PROVIDER_CALL_SECS,
            ),
        }
    }

    /// Register a provider adapter.
    pub fn with_provider(mut self, provider: ProviderRef) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with_clock(mut self, clock: ClockRef) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_limiter_config(mut self, config: LimiterConfig) -> Self {
        self.limiter_config = config;
        self
    }

    pub fn with_usage_sink(mut self, sink: UsageSinkRef) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_default_policy(mut self, policy: RoutingPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Build the layer. The registry always carries the full shipped
    /// catalog so routing targets can be validated even for providers
    /// without credentials; dispatching to an unconfigured provider
    /// fails with an Auth error.
    pub fn build(self) -> ModelIntegrationLayer {
        let registry = Arc::new(ModelRegistry::new(
            self.registry_version.clone(),
            catalog::all_models(),
        ));
        ModelIntegrationLayer {
            registry,
            providers: self.providers,
            history: Arc::new(PerformanceHistory::new()),
            cache: ResponseCache::new(self.cache_ttl, self.clock.clone()),
            limiter: RateSpendLimiter::new(self.limiter_config, self.clock.clone()),
            sink: self.sink,
            default_policy: self.default_policy,
            provider_timeout: self.provider_timeout,
            clock: self.clock,
        }
    }
}

impl Default for MilBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The provider gateway.
pub struct ModelIntegrationLayer {
    registry: Arc<ModelRegistry>,
    providers: HashMap<String, ProviderRef>,
    history: PerformanceHistoryRef,
    cache: ResponseCache,
    limiter: RateSpendLimiter,
    sink: UsageSinkRef,
    default_policy: RoutingPolicy,
    provider_timeout: Duration,
    clock: ClockRef,
}

impl ModelIntegrationLayer {
    /// Assemble the layer from settings: one adapter per configured API
    /// key, limiter defaults from the rate-limit setting, and default
    /// routing targets validated against the registry.
    pub fn from_settings(settings: &Settings) -> HiveResult<Self> {
        let mut builder = MilBuilder::new().with_limiter_config(
            LimiterConfig::from_requests_per_minute(settings.rate_limit_requests_per_minute),
        );

        for (provider, key) in &settings.api_keys {
            let adapter: ProviderRef = match provider.as_str() {
                "openai" => Arc::new(OpenAiChatProvider::openai(key.clone())),
                "anthropic" => Arc::new(AnthropicProvider::new(key.clone())),
                "google" => Arc::new(GoogleProvider::new(key.clone())),
                "groq" => Arc::new(compat::groq(key.clone())),
                "perplexity" => Arc::new(compat::perplexity(key.clone())),
                "xai" => Arc::new(compat::xai(key.clone())),
                "moonshot" => Arc::new(compat::moonshot(key.clone())),
                "qwen" => Arc::new(compat::qwen(key.clone())),
                other => {
                    tracing::warn!(provider = %other, "ignoring API key for unknown provider");
                    continue;
                }
            };
            builder = builder.with_provider(adapter);
        }

        let mil = builder.build();
        mil.registry.validate_defaults(settings.models.entries())?;
        Ok(mil)
    }

    /// The model registry (read-only).
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Whether any provider adapter is registered.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Capability-filtered registry view.
    pub fn list_models(&self, filter: &ModelFilter) -> Vec<ModelDescriptor> {
        self.registry.list(filter).into_iter().cloned().collect()
    }

    /// Pure routing recommendation. When provider adapters are
    /// registered, only their models are considered; routing to a
    /// provider without credentials would fail at dispatch anyway.
    pub fn recommend_model(
        &self,
        requirements: &ModelRequirements,
        policy: &RoutingPolicy,
    ) -> HiveResult<String> {
        if self.providers.is_empty() {
            return recommend_model(&self.registry, &self.history, requirements, policy);
        }
        routing::recommend_from(
            self.registry
                .all()
                .filter(|d| self.providers.contains_key(&d.provider)),
            &self.history,
            requirements,
            policy,
        )
    }

    /// Execute one generation through the full pipeline.
    pub async fn generate(
        &self,
        req: &LlmRequest,
        policy: Option<&RoutingPolicy>,
    ) -> HiveResult<LlmResponse> {
        let policy = policy.unwrap_or(&self.default_policy);
        let primary = self.resolve_model(req, policy)?;

        // Fallback chain: the resolved model first, then the policy's
        // fallbacks. Each hop refreshes admission.
        let mut chain: Vec<String> = vec![primary];
        for fallback in &policy.fallback_models {
            match self.registry.get(fallback) {
                Some(desc) => chain.push(desc.qualified_id()),
                None => tracing::warn!(model = %fallback, "unknown fallback model skipped"),
            }
        }

        let last = chain.len() - 1;
        for (hop, qualified_id) in chain.iter().enumerate() {
            match self.generate_on(req, qualified_id).await {
                Ok(resp) => return Ok(resp),
                Err(err) if err.retriable && hop < last => {
                    tracing::warn!(
                        model = %qualified_id,
                        error = %err,
                        "retriable provider failure, trying next fallback"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("fallback chain always returns from the last hop");
    }

    /// Resolve the target model to a qualified id.
    fn resolve_model(&self, req: &LlmRequest, policy: &RoutingPolicy) -> HiveResult<String> {
        if let Some(pinned) = &req.model_id {
            return Ok(self.registry.require(pinned)?.qualified_id());
        }
        let requirements = ModelRequirements {
            capabilities: req.required_capabilities.clone(),
            estimated_prompt_tokens: req.estimated_prompt_tokens(),
            max_tokens: req.max_tokens,
        };
        self.recommend_model(&requirements, policy)
    }

    /// One generation attempt against one model, with caching and
    /// admission.
    async fn generate_on(&self, req: &LlmRequest, qualified_id: &str) -> HiveResult<LlmResponse> {
        let descriptor = self.registry.require(qualified_id)?.clone();
        let key = fingerprint(req, qualified_id);

        match self.cache.acquire(&key).await {
            Acquire::Hit(resp) => {
                self.record(req, &descriptor, Some(&resp), None);
                Ok(resp)
            }
            Acquire::Leader(guard) => {
                let result = self.dispatch(req, &descriptor).await;
                match result {
                    Ok(resp) => {
                        guard.complete(&resp);
                        self.history
                            .observe(&descriptor.qualified_id(), resp.latency_ms);
                        self.record(req, &descriptor, Some(&resp), None);
                        Ok(resp)
                    }
                    Err(err) => {
                        guard.abandon();
                        self.record(req, &descriptor, None, Some(&err));
                        Err(err)
                    }
                }
            }
        }
    }

    /// Admission plus the vendor call under the provider deadline.
    async fn dispatch(
        &self,
        req: &LlmRequest,
        descriptor: &ModelDescriptor,
    ) -> HiveResult<LlmResponse> {
        let provider = self.providers.get(&descriptor.provider).ok_or_else(|| {
            HiveError::auth(format!(
                "API key not configured for provider '{}'",
                descriptor.provider
            ))
            .with_suggestion(format!(
                "Set {}_API_KEY to enable this provider",
                descriptor.provider.to_uppercase()
            ))
        })?;

        let estimated_cost =
            descriptor.cost_of(req.estimated_prompt_tokens(), req.max_tokens);
        let reservation = self
            .limiter
            .admit(&descriptor.provider, &descriptor.id, estimated_cost)?;

        let mut vendor_req = req.clone();
        vendor_req.model_id = Some(descriptor.id.clone());

        match tokio::time::timeout(self.provider_timeout, provider.generate(&vendor_req)).await {
            Ok(Ok(resp)) => {
                reservation.settle(resp.cost_usd);
                Ok(resp)
            }
            Ok(Err(err)) => {
                // Reservation drops here, releasing the held estimate.
                Err(err)
            }
            Err(_) => Err(HiveError::timeout(format!(
                "provider '{}' exceeded the {}s call deadline",
                descriptor.provider,
                self.provider_timeout.as_secs()
            ))),
        }
    }

    /// Emit the usage record for one call, successful or not.
    fn record(
        &self,
        req: &LlmRequest,
        descriptor: &ModelDescriptor,
        resp: Option<&LlmResponse>,
        err: Option<&HiveError>,
    ) {
        let record = match (resp, err) {
            (Some(resp), _) => UsageRecord {
                model_id: descriptor.qualified_id(),
                provider: descriptor.provider.clone(),
                task_type: req.task_type.clone(),
                user_id: req.user_id.clone(),
                input_tokens: resp.input_tokens,
                output_tokens: resp.output_tokens,
                total_tokens: resp.total_tokens(),
                cost_usd: resp.cost_usd,
                latency_ms: resp.latency_ms,
                was_cached: resp.was_cached,
                success: true,
                error_kind: None,
                request_metadata: req.metadata.clone(),
                created_at: self.clock.now(),
            },
            (None, err) => UsageRecord {
                model_id: descriptor.qualified_id(),
                provider: descriptor.provider.clone(),
                task_type: req.task_type.clone(),
                user_id: req.user_id.clone(),
                input_tokens: 0,
                output_tokens: 0,
                total_tokens: 0,
                cost_usd: 0.0,
                latency_ms: 0.0,
                was_cached: false,
                success: false,
                error_kind: err.map(|e| e.kind),
                request_metadata: req.metadata.clone(),
                created_at: self.clock.now(),
            },
        };
        self.sink.record(record);
    }
}
