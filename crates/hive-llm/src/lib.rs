// Hive LLM - Model Integration Layer
//
// The sole path from agent code to an LLM vendor: provider adapters,
// policy-weighted routing, a single-flight response cache, rate/spend
// admission, and out-of-band usage tracking.

pub mod cache;
pub mod limiter;
pub mod mil;
pub mod provider;
pub mod providers;
pub mod routing;
pub mod types;
pub mod usage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{fingerprint, ResponseCache};
pub use limiter::{LimiterConfig, RateSpendLimiter, Reservation};
pub use mil::{MilBuilder, ModelIntegrationLayer};
pub use provider::{estimate_tokens, LlmProvider, ProviderRef};
pub use providers::{AnthropicProvider, GoogleProvider, OpenAiChatProvider};
pub use routing::{ModelRequirements, PerformanceHistory, RoutingPolicy};
pub use types::{
    ChatMessage, FinishReason, LlmRequest, LlmResponse, MessageRole, ToolDefinition,
};
pub use usage::{ChannelSink, MemorySink, TracingSink, UsageRecord, UsageSink, UsageSinkRef};
