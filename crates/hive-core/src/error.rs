//! Error taxonomy shared by every Hive crate
//!
//! All core operations return `HiveResult<T>`. Retry and fallback logic
//! consults the `retriable` flag, never the concrete kind, so providers
//! and orchestrators stay decoupled from each other's failure modes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of every error that can leave a core component.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller supplied bad input
    Validation,
    /// Credential invalid or absent
    Auth,
    /// Policy denied access
    Permission,
    /// Entity does not exist
    NotFound,
    /// State precondition failed
    Conflict,
    /// Limiter denied admission
    RateLimit,
    /// Deadline exceeded
    Timeout,
    /// No eligible model or pool exhausted
    Capacity,
    /// Vendor call failed
    Provider,
    /// Bug or invariant violation
    Internal,
}

impl ErrorKind {
    /// Default retriability for this kind. Provider and Capacity errors
    /// decide per-instance; everything else is fixed.
    pub fn default_retriable(&self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::Timeout)
    }

    /// Safe message shown to end users when no better one is supplied.
    pub fn default_user_message(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Invalid request data.",
            ErrorKind::Auth => "Authentication required.",
            ErrorKind::Permission => "You are not authorized to perform this action.",
            ErrorKind::NotFound => "The requested resource was not found.",
            ErrorKind::Conflict => "The resource is in a conflicting state.",
            ErrorKind::RateLimit => "Too many requests. Please try again later.",
            ErrorKind::Timeout => "The operation timed out. Please try again.",
            ErrorKind::Capacity => "No capacity is currently available for this request.",
            ErrorKind::Provider => "An upstream provider failed. Please try again.",
            ErrorKind::Internal => "An unexpected error occurred. Please try again.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Capacity => "capacity",
            ErrorKind::Provider => "provider",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Structured error carried through every Hive call chain.
///
/// `message` may contain operator detail; `user_message` is always safe
/// to display and never leaks stack traces, SQL, or vendor strings.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct HiveError {
    /// Error classification
    pub kind: ErrorKind,

    /// Operator-facing detail
    pub message: String,

    /// Display-safe message
    pub user_message: String,

    /// Structured detail (sub-codes, offending fields, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Whether the caller may retry after backoff
    pub retriable: bool,

    /// Limiter hint, set for RateLimit errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,

    /// Optional remediation hints for the caller
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl HiveError {
    /// Create an error of the given kind with default retriability.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            user_message: kind.default_user_message().to_string(),
            details: None,
            retriable: kind.default_retriable(),
            retry_after_ms: None,
            suggestions: Vec::new(),
        }
    }

    /// Caller supplied bad input
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Credential invalid or absent
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    /// Policy denied access
    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    /// Entity does not exist
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// State precondition failed
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Limiter denied admission; `retry_after_ms` hints when to retry
    pub fn rate_limit(message: impl Into<String>, retry_after_ms: u64) -> Self {
        let mut err = Self::new(ErrorKind::RateLimit, message);
        err.retry_after_ms = Some(retry_after_ms);
        err
    }

    /// Deadline exceeded
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// No eligible model or pool exhausted
    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Capacity, message)
    }

    /// Vendor call failed; `retriable` reflects the sub-classification
    pub fn provider(message: impl Into<String>, retriable: bool) -> Self {
        let mut err = Self::new(ErrorKind::Provider, message);
        err.retriable = retriable;
        err
    }

    /// Bug or invariant violation. Logged with full detail, surfaced to
    /// users as a generic message.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(error = %message, "internal error");
        Self::new(ErrorKind::Internal, message)
    }

    /// Attach structured detail.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Override the display-safe message.
    pub fn with_user_message(mut self, user_message: impl Into<String>) -> Self {
        self.user_message = user_message.into();
        self
    }

    /// Add a remediation hint.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Provider sub-code recorded in details, e.g. "no_eligible_model".
    pub fn with_code(self, code: &str) -> Self {
        self.with_details(serde_json::json!({ "code": code }))
    }

    /// Whether this error kind is Timeout.
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}

impl From<serde_json::Error> for HiveError {
    fn from(err: serde_json::Error) -> Self {
        HiveError::validation(format!("JSON serialization failed: {}", err))
    }
}

/// Result alias used throughout the workspace.
pub type HiveResult<T> = Result<T, HiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_retriability() {
        assert!(ErrorKind::RateLimit.default_retriable());
        assert!(ErrorKind::Timeout.default_retriable());
        assert!(!ErrorKind::Validation.default_retriable());
        assert!(!ErrorKind::Permission.default_retriable());
        assert!(!ErrorKind::Internal.default_retriable());
    }

    #[test]
    fn test_constructor_defaults() {
        let err = HiveError::validation("bad field");
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(!err.retriable);
        assert_eq!(err.user_message, "Invalid request data.");

        let err = HiveError::rate_limit("bucket empty", 1500);
        assert!(err.retriable);
        assert_eq!(err.retry_after_ms, Some(1500));
    }

    #[test]
    fn test_provider_retriability_is_per_instance() {
        assert!(HiveError::provider("503 from vendor", true).retriable);
        assert!(!HiveError::provider("model rejected input", false).retriable);
    }

    #[test]
    fn test_user_message_never_contains_operator_detail() {
        let err = HiveError::internal("panic at cache.rs:42");
        assert!(!err.user_message.contains("cache.rs"));
    }

    #[test]
    fn test_serialization_round_trip() {
        let err = HiveError::capacity("no eligible model")
            .with_code("no_eligible_model")
            .with_suggestion("relax max_cost_per_request");
        let json = serde_json::to_string(&err).unwrap();
        let parsed: HiveError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, ErrorKind::Capacity);
        assert_eq!(parsed.suggestions.len(), 1);
        assert_eq!(
            parsed.details.unwrap().get("code").and_then(|v| v.as_str()),
            Some("no_eligible_model")
        );
    }
}
