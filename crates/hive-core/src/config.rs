//! Runtime configuration loaded from the environment
//!
//! Every recognized key has a default that keeps the runtime usable in a
//! bare environment: no DATABASE_URL means in-memory persistence, no
//! provider keys means the deterministic fallbacks run instead of LLM
//! calls.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Known provider names, used to look up `<PROVIDER>_API_KEY` variables.
pub const PROVIDERS: &[&str] = &[
    "openai",
    "anthropic",
    "groq",
    "google",
    "perplexity",
    "xai",
    "moonshot",
    "qwen",
];

/// Default routing targets, one per task class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefaults {
    pub default: String,
    pub reasoning: String,
    pub advanced: String,
    pub fast: String,
    pub multimodal: String,
    pub embedding: String,
    pub search: String,
    pub cost_efficient: String,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            default: "openai/gpt-4o-mini".to_string(),
            reasoning: "openai/o3-mini".to_string(),
            advanced: "anthropic/claude-sonnet-4-20250514".to_string(),
            fast: "groq/llama-3.1-8b-instant".to_string(),
            multimodal: "openai/gpt-4o".to_string(),
            embedding: "openai/text-embedding-3-small".to_string(),
            search: "perplexity/sonar".to_string(),
            cost_efficient: "openai/gpt-4o-mini".to_string(),
        }
    }
}

impl ModelDefaults {
    /// (role, model-id) pairs for registry validation.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        vec![
            ("default", &self.default),
            ("reasoning", &self.reasoning),
            ("advanced", &self.advanced),
            ("fast", &self.fast),
            ("multimodal", &self.multimodal),
            ("embedding", &self.embedding),
            ("search", &self.search),
            ("cost_efficient", &self.cost_efficient),
        ]
    }
}

/// Process-wide settings. Constructed once at startup and passed by
/// reference into the services that need it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Persistence DSN; None means in-memory mode
    pub database_url: Option<String>,

    /// Token signing material, consumed by the outer HTTP layer only
    pub jwt_secret_key: Option<String>,
    pub jwt_algorithm: String,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,

    /// Local blob directory, validated against a candidate list
    pub storage_path: PathBuf,

    /// Default routing targets
    pub models: ModelDefaults,

    /// Limiter default: requests per minute per (provider, model)
    pub rate_limit_requests_per_minute: u32,

    /// Idle session timeout
    pub session_timeout_minutes: u64,

    /// Upper bound on concurrently tracked sessions
    pub max_concurrent_sessions: usize,

    /// Per-agent execution deadline
    pub agent_timeout_seconds: u64,

    /// Whole-workflow deadline
    pub max_workflow_duration_hours: u64,

    /// Team size cap for one workflow
    pub max_agents_per_workflow: usize,

    /// Provider name -> API key, for every provider with a key set
    pub api_keys: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt_secret_key: None,
            jwt_algorithm: "HS256".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            storage_path: PathBuf::from("./storage"),
            models: ModelDefaults::default(),
            rate_limit_requests_per_minute: 60,
            session_timeout_minutes: 30,
            max_concurrent_sessions: 1000,
            agent_timeout_seconds: 300,
            max_workflow_duration_hours: 24,
            max_agents_per_workflow: 10,
            api_keys: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Self {
        let defaults = ModelDefaults::default();
        let mut api_keys = HashMap::new();
        for provider in PROVIDERS {
            let var = format!("{}_API_KEY", provider.to_uppercase());
            if let Ok(key) = std::env::var(&var) {
                if !key.trim().is_empty() {
                    api_keys.insert(provider.to_string(), key);
                }
            }
        }

        let storage_path = resolve_storage_path(
            std::env::var("STORAGE_PATH").ok().map(PathBuf::from),
        );

        Self {
            database_url: env_opt("DATABASE_URL"),
            jwt_secret_key: env_opt("JWT_SECRET_KEY"),
            jwt_algorithm: std::env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or_else(|_| Settings::default().cors_origins),
            storage_path,
            models: ModelDefaults {
                default: env_or("DEFAULT_MODEL", &defaults.default),
                reasoning: env_or("REASONING_MODEL", &defaults.reasoning),
                advanced: env_or("ADVANCED_MODEL", &defaults.advanced),
                fast: env_or("FAST_MODEL", &defaults.fast),
                multimodal: env_or("MULTIMODAL_MODEL", &defaults.multimodal),
                embedding: env_or("EMBEDDING_MODEL", &defaults.embedding),
                search: env_or("SEARCH_MODEL", &defaults.search),
                cost_efficient: env_or("COST_EFFICIENT_MODEL", &defaults.cost_efficient),
            },
            rate_limit_requests_per_minute: env_parse("RATE_LIMIT_REQUESTS_PER_MINUTE", 60),
            session_timeout_minutes: env_parse("SESSION_TIMEOUT_MINUTES", 30),
            max_concurrent_sessions: env_parse("MAX_CONCURRENT_SESSIONS", 1000),
            agent_timeout_seconds: env_parse("AGENT_TIMEOUT_SECONDS", 300),
            max_workflow_duration_hours: env_parse("MAX_WORKFLOW_DURATION_HOURS", 24),
            max_agents_per_workflow: env_parse("MAX_AGENTS_PER_WORKFLOW", 10),
            api_keys,
        }
    }

    /// Whether persistence should run in-memory.
    pub fn in_memory(&self) -> bool {
        self.database_url.is_none()
    }

    /// API key for a provider, if configured.
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys.get(provider).map(|s| s.as_str())
    }

    /// Whether at least one provider has a key configured.
    pub fn any_provider_configured(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// CORS_ORIGINS accepts either a JSON array or a comma-separated list.
fn parse_origins(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
            return list;
        }
        tracing::warn!("CORS_ORIGINS looked like JSON but failed to parse; falling back to CSV");
    }
    trimmed
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Walk the candidate list until a writable directory is found. The
/// configured path wins when usable; otherwise fall through the known
/// platform mounts and end on a relative directory that always works.
fn resolve_storage_path(configured: Option<PathBuf>) -> PathBuf {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = configured {
        candidates.push(path);
    }
    candidates.push(PathBuf::from("/app/storage"));
    candidates.push(PathBuf::from("/data/storage"));
    candidates.push(std::env::temp_dir().join("hive-storage"));
    candidates.push(PathBuf::from("./storage"));

    for candidate in &candidates {
        if is_usable_dir(candidate) {
            return candidate.clone();
        }
        tracing::debug!(path = %candidate.display(), "storage candidate not usable");
    }
    // Last candidate is relative and creatable at first write.
    candidates.pop().unwrap_or_else(|| PathBuf::from("./storage"))
}

fn is_usable_dir(path: &Path) -> bool {
    if path.is_dir() {
        return !path.metadata().map(|m| m.permissions().readonly()).unwrap_or(true);
    }
    // Creating it proves the parent is writable.
    std::fs::create_dir_all(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins_json_array() {
        let origins = parse_origins(r#"["https://a.example", "https://b.example"]"#);
        assert_eq!(origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_parse_origins_comma_list() {
        let origins = parse_origins("https://a.example, https://b.example ,");
        assert_eq!(origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_parse_origins_malformed_json_falls_back() {
        let origins = parse_origins(r#"["https://a.example", oops"#);
        assert_eq!(origins.len(), 2);
        assert!(origins[0].contains("a.example"));
    }

    #[test]
    fn test_storage_path_falls_back_to_writable() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_storage_path(Some(dir.path().join("blobs")));
        assert_eq!(resolved, dir.path().join("blobs"));
        assert!(resolved.is_dir());
    }

    #[test]
    fn test_defaults_are_consistent() {
        let settings = Settings::default();
        assert!(settings.in_memory());
        assert_eq!(settings.agent_timeout_seconds, 300);
        assert_eq!(settings.max_workflow_duration_hours, 24);
        assert_eq!(settings.models.entries().len(), 8);
    }
}
