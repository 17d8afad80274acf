//! Model descriptors and the process-wide model registry
//!
//! The registry is built once at startup from the provider catalogs and
//! is read-only afterwards. Routing decisions and cost accounting both
//! read descriptor prices, so a descriptor is the single source of truth
//! for what a call costs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::{HiveError, HiveResult};

/// Capabilities a model can declare.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
    TextGeneration,
    Reasoning,
    Multimodal,
    Vision,
    FunctionCalling,
    StructuredOutput,
    Embedding,
    Search,
    LongContext,
}

/// Static description of one model offered by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model identifier as the vendor knows it (e.g. "gpt-4o-mini")
    pub id: String,

    /// Provider name (e.g. "openai")
    pub provider: String,

    /// Human-readable name
    pub name: String,

    /// Short description
    pub description: String,

    /// Declared capabilities
    pub capabilities: Vec<ModelCapability>,

    /// Context window in tokens
    pub context_window: u32,

    /// USD per million input tokens
    pub input_cost_per_million_tokens: f64,

    /// USD per million output tokens
    pub output_cost_per_million_tokens: f64,

    /// Observed mean latency, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_latency_ms: Option<f64>,

    /// Quality score in [0, 1], if benchmarked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,

    /// Extended-thinking model
    #[serde(default)]
    pub is_reasoning: bool,

    /// Accepts non-text input
    #[serde(default)]
    pub is_multimodal: bool,
}

impl ModelDescriptor {
    /// Qualified id of the form `provider/model-id`.
    pub fn qualified_id(&self) -> String {
        format!("{}/{}", self.provider, self.id)
    }

    /// Whether this model declares every capability in `required`.
    pub fn supports_all(&self, required: &[ModelCapability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }

    /// Cost in USD for the given token counts at this descriptor's
    /// prices.
    pub fn cost_of(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_cost_per_million_tokens
            + output_tokens as f64 * self.output_cost_per_million_tokens)
            / 1_000_000.0
    }
}

impl fmt::Display for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_id())
    }
}

/// Capability-based filter for registry listings.
#[derive(Debug, Clone, Default)]
pub struct ModelFilter {
    /// Only models declaring all of these capabilities
    pub capabilities: Vec<ModelCapability>,
    /// Only models from this provider
    pub provider: Option<String>,
    /// Minimum context window
    pub min_context_window: Option<u32>,
}

/// Immutable registry of every known model, keyed by qualified id.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDescriptor>,
    version: String,
}

impl ModelRegistry {
    /// Build a registry from descriptors. The version string is carried
    /// in operational logs so deployments can be correlated with the
    /// catalog they shipped.
    pub fn new(version: impl Into<String>, descriptors: Vec<ModelDescriptor>) -> Self {
        let version = version.into();
        let mut models = HashMap::with_capacity(descriptors.len());
        for desc in descriptors {
            models.insert(desc.qualified_id(), desc);
        }
        tracing::info!(
            registry_version = %version,
            model_count = models.len(),
            "model registry initialized"
        );
        Self { models, version }
    }

    /// Registry catalog version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Look up a model by qualified id (`provider/model-id`) or by bare
    /// model id when it is unambiguous.
    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        if let Some(desc) = self.models.get(id) {
            return Some(desc);
        }
        let mut matches = self.models.values().filter(|d| d.id == id);
        let first = matches.next();
        if matches.next().is_some() {
            return None; // ambiguous bare id
        }
        first
    }

    /// Look up a model, failing with NotFound when absent.
    pub fn require(&self, id: &str) -> HiveResult<&ModelDescriptor> {
        self.get(id)
            .ok_or_else(|| HiveError::not_found(format!("Model '{}' not found in registry", id)))
    }

    /// All descriptors, unordered.
    pub fn all(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Filtered listing, sorted by qualified id for stable output.
    pub fn list(&self, filter: &ModelFilter) -> Vec<&ModelDescriptor> {
        let mut out: Vec<&ModelDescriptor> = self
            .models
            .values()
            .filter(|d| d.supports_all(&filter.capabilities))
            .filter(|d| {
                filter
                    .provider
                    .as_deref()
                    .map_or(true, |p| d.provider == p)
            })
            .filter(|d| {
                filter
                    .min_context_window
                    .map_or(true, |w| d.context_window >= w)
            })
            .collect();
        out.sort_by(|a, b| a.qualified_id().cmp(&b.qualified_id()));
        out
    }

    /// Validate that every declared default routing target exists.
    /// Called once at startup; a missing target is a deployment error.
    pub fn validate_defaults<'a>(
        &self,
        defaults: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> HiveResult<()> {
        for (role, model_id) in defaults {
            if self.get(model_id).is_none() {
                return Err(HiveError::validation(format!(
                    "Default routing target '{}' ({}) is not in the model registry",
                    model_id, role
                )));
            }
        }
        Ok(())
    }
}
