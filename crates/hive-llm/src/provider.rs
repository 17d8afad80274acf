//! Provider contract and shared vendor-error classification
//!
//! Adapters are the only code that sees vendor error shapes. Everything
//! they return is already classified into the workspace taxonomy, so
//! orchestrators and retry logic never match on vendor strings.

use async_trait::async_trait;
use hive_core::{HiveError, HiveResult, ModelDescriptor};
use std::sync::Arc;

use crate::types::{LlmRequest, LlmResponse};

/// Closed interface every vendor adapter implements.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// Models this adapter can serve
    fn models(&self) -> Vec<ModelDescriptor>;

    /// Execute one generation. `req.model_id` is already resolved to a
    /// bare model id this provider declared.
    async fn generate(&self, req: &LlmRequest) -> HiveResult<LlmResponse>;

    /// Cost in USD for the given token counts on the given model.
    fn cost_of(&self, input_tokens: u32, output_tokens: u32, model_id: &str) -> f64 {
        self.models()
            .iter()
            .find(|m| m.id == model_id)
            .map(|m| m.cost_of(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }
}

/// Shared provider handle.
pub type ProviderRef = Arc<dyn LlmProvider>;

/// Best-effort token estimate when a vendor omits usage counts.
/// Heuristic: one token per four bytes of UTF-8, rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    estimate_tokens_from_bytes(text.len())
}

/// Byte-count variant of [`estimate_tokens`].
pub fn estimate_tokens_from_bytes(bytes: usize) -> u32 {
    ((bytes + 3) / 4) as u32
}

/// Map an HTTP failure from a vendor into the taxonomy. Bodies are kept
/// in operator detail only.
pub fn classify_http_failure(provider: &str, status: u16, body: &str) -> HiveError {
    let detail = format!("{} returned HTTP {}: {}", provider, status, truncate(body, 300));
    match status {
        400 | 422 => HiveError::provider(detail, false)
            .with_code("invalid_request")
            .with_user_message("The provider rejected this request."),
        401 | 403 => HiveError::auth(detail)
            .with_suggestion(format!(
                "Check the {}_API_KEY environment variable",
                provider.to_uppercase()
            )),
        404 => HiveError::not_found(detail),
        408 => HiveError::timeout(detail),
        429 => HiveError::rate_limit(detail, 1000),
        500..=599 => HiveError::provider(detail, true).with_code("upstream_unavailable"),
        _ => HiveError::provider(detail, false).with_code("unexpected_status"),
    }
}

/// Map a transport-level failure (connect, TLS, body read) into the
/// taxonomy. Transport failures are retriable.
pub fn classify_transport_failure(provider: &str, err: &reqwest::Error) -> HiveError {
    if err.is_timeout() {
        return HiveError::timeout(format!("{} request timed out: {}", provider, err));
    }
    HiveError::provider(format!("{} transport error: {}", provider, err), true)
        .with_code("transport")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::ErrorKind;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_http_classification() {
        assert_eq!(classify_http_failure("openai", 401, "{}").kind, ErrorKind::Auth);
        assert_eq!(classify_http_failure("openai", 404, "{}").kind, ErrorKind::NotFound);
        assert_eq!(classify_http_failure("openai", 429, "{}").kind, ErrorKind::RateLimit);
        assert_eq!(classify_http_failure("openai", 408, "{}").kind, ErrorKind::Timeout);

        let server = classify_http_failure("openai", 503, "{}");
        assert_eq!(server.kind, ErrorKind::Provider);
        assert!(server.retriable);

        let bad_request = classify_http_failure("openai", 400, "{}");
        assert_eq!(bad_request.kind, ErrorKind::Provider);
        assert!(!bad_request.retriable);
    }

    #[test]
    fn test_classification_never_leaks_body_to_users() {
        let err = classify_http_failure("openai", 500, "secret internal state");
        assert!(err.message.contains("secret internal state"));
        assert!(!err.user_message.contains("secret"));
    }
}
