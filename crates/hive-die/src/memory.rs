//! Three-tier contextual memory
//!
//! One instance lives with each agent for the duration of a session.
//! Short-term holds the working set and self-compresses into the
//! summary tier; long-term persists with the session and is never
//! compressed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Short-term entry count that triggers compression.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 8;

/// Insertion-ordered key/value tier. Tiers are small, so lookups walk
/// the entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryTier {
    entries: Vec<(String, Value)>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, preserving first-insertion order.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for MemoryTier {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut tier = Self::new();
        for (k, v) in iter {
            tier.insert(k, v);
        }
        tier
    }
}

/// Per-agent, per-session contextual memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextualMemory {
    /// Working set, compressed when it exceeds the threshold
    pub short_term: MemoryTier,
    /// Durable facts, persisted with the session
    pub long_term: MemoryTier,
    /// Digests produced by compression
    pub summary: MemoryTier,
    /// Compression trigger
    #[serde(default = "default_threshold")]
    pub compress_threshold: usize,
}

fn default_threshold() -> usize {
    DEFAULT_COMPRESS_THRESHOLD
}

impl ContextualMemory {
    pub fn new() -> Self {
        Self {
            short_term: MemoryTier::new(),
            long_term: MemoryTier::new(),
            summary: MemoryTier::new(),
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.compress_threshold = threshold;
        self
    }

    /// Merge new context into short-term, compressing first when the
    /// working set is already over the threshold.
    pub fn update_context(&mut self, context: impl IntoIterator<Item = (String, Value)>) {
        if self.short_term.len() > self.compress_threshold {
            self.compress();
        }
        for (key, value) in context {
            self.short_term.insert(key, value);
        }
    }

    /// Record a durable fact.
    pub fn remember(&mut self, key: impl Into<String>, value: Value) {
        self.long_term.insert(key, value);
    }

    /// Fold the short-term working set into a `recent_context` digest.
    ///
    /// Postcondition: short-term is empty, summary gained the digest,
    /// long-term is untouched.
    pub fn compress(&mut self) {
        if self.short_term.is_empty() {
            return;
        }
        let digest = self
            .short_term
            .iter()
            .map(|(key, value)| format!("{}: {}", key, render_value(value)))
            .collect::<Vec<_>>()
            .join("; ");
        self.summary
            .insert("recent_context", Value::String(digest));
        self.short_term.clear();
        tracing::debug!("short-term memory compressed into summary");
    }

    /// Compact text rendering of the memory for prompt assembly.
    pub fn digest(&self) -> String {
        let mut sections = Vec::new();
        if !self.summary.is_empty() {
            let lines: Vec<String> = self
                .summary
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, render_value(v)))
                .collect();
            sections.push(format!("Session summary:\n{}", lines.join("\n")));
        }
        if !self.short_term.is_empty() {
            let lines: Vec<String> = self
                .short_term
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, render_value(v)))
                .collect();
            sections.push(format!("Recent context:\n{}", lines.join("\n")));
        }
        if !self.long_term.is_empty() {
            let lines: Vec<String> = self
                .long_term
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, render_value(v)))
                .collect();
            sections.push(format!("Known facts:\n{}", lines.join("\n")));
        }
        sections.join("\n\n")
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tier_preserves_insertion_order() {
        let mut tier = MemoryTier::new();
        tier.insert("b", json!(1));
        tier.insert("a", json!(2));
        tier.insert("b", json!(3)); // replace keeps position

        let keys: Vec<&str> = tier.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(tier.get("b"), Some(&json!(3)));
    }

    #[test]
    fn test_update_context_merges() {
        let mut memory = ContextualMemory::new();
        memory.update_context([
            ("task".to_string(), json!("analysis")),
            ("status".to_string(), json!("in_progress")),
        ]);
        memory.update_context([("priority".to_string(), json!("high"))]);

        assert_eq!(memory.short_term.len(), 3);
        assert_eq!(memory.short_term.get("task"), Some(&json!("analysis")));
    }

    #[test]
    fn test_compress_postcondition() {
        let mut memory = ContextualMemory::new();
        memory.remember("user_type", json!("developer"));
        memory.update_context([
            ("first".to_string(), json!("alpha")),
            ("second".to_string(), json!("beta")),
        ]);

        memory.compress();

        assert!(memory.short_term.is_empty());
        let digest = memory.summary.get("recent_context").unwrap();
        let digest = digest.as_str().unwrap();
        assert!(digest.contains("first: alpha"));
        assert!(digest.contains("second: beta"));
        // Values concatenated in insertion order.
        assert!(digest.find("alpha").unwrap() < digest.find("beta").unwrap());
        // Long-term untouched.
        assert_eq!(memory.long_term.get("user_type"), Some(&json!("developer")));
    }

    #[test]
    fn test_compress_on_empty_is_noop() {
        let mut memory = ContextualMemory::new();
        memory.compress();
        assert!(memory.summary.is_empty());
    }

    #[test]
    fn test_auto_compression_over_threshold() {
        let mut memory = ContextualMemory::new().with_threshold(2);
        memory.update_context([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
            ("c".to_string(), json!(3)),
        ]);
        // Over the threshold now; the next update compresses first.
        memory.update_context([("d".to_string(), json!(4))]);

        assert_eq!(memory.short_term.len(), 1);
        assert!(memory.summary.get("recent_context").is_some());
    }

    #[test]
    fn test_digest_mentions_all_tiers() {
        let mut memory = ContextualMemory::new();
        memory.remember("domain", json!("finance"));
        memory.update_context([("question".to_string(), json!("What is Python?"))]);
        memory.summary.insert("main_points", json!("User is learning"));

        let digest = memory.digest();
        assert!(digest.contains("User is learning"));
        assert!(digest.contains("What is Python?"));
        assert!(digest.contains("finance"));
    }
}
