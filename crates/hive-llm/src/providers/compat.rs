//! OpenAI-compatible vendor endpoints
//!
//! groq, perplexity, xai, moonshot, and qwen all speak the
//! chat-completions wire format, so each gets the shared adapter with
//! its own base URL and catalog.

use crate::providers::catalog;
use crate::providers::openai::OpenAiChatProvider;

/// Groq adapter.
pub fn groq(api_key: impl Into<String>) -> OpenAiChatProvider {
    OpenAiChatProvider::with_endpoint(
        "groq",
        "https://api.groq.com/openai/v1",
        api_key,
        catalog::groq_models(),
    )
}

/// Perplexity adapter.
pub fn perplexity(api_key: impl Into<String>) -> OpenAiChatProvider {
    OpenAiChatProvider::with_endpoint(
        "perplexity",
        "https://api.perplexity.ai",
        api_key,
        catalog::perplexity_models(),
    )
}

/// xAI adapter.
pub fn xai(api_key: impl Into<String>) -> OpenAiChatProvider {
    OpenAiChatProvider::with_endpoint(
        "xai",
        "https://api.x.ai/v1",
        api_key,
        catalog::xai_models(),
    )
}

/// Moonshot adapter.
pub fn moonshot(api_key: impl Into<String>) -> OpenAiChatProvider {
    OpenAiChatProvider::with_endpoint(
        "moonshot",
        "https://api.moonshot.ai/v1",
        api_key,
        catalog::moonshot_models(),
    )
}

/// Qwen (DashScope compatible-mode) adapter.
pub fn qwen(api_key: impl Into<String>) -> OpenAiChatProvider {
    OpenAiChatProvider::with_endpoint(
        "qwen",
        "https://dashscope-intl.aliyuncs.com/compatible-mode/v1",
        api_key,
        catalog::qwen_models(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LlmProvider;

    #[test]
    fn test_compat_providers_expose_their_catalogs() {
        let provider = groq("key");
        assert_eq!(provider.name(), "groq");
        assert!(provider.models().iter().all(|m| m.provider == "groq"));

        let provider = qwen("key");
        assert_eq!(provider.name(), "qwen");
        assert!(!provider.models().is_empty());
    }
}
