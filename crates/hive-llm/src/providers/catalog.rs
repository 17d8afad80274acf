//! Built-in model catalogs
//!
//! Descriptors ship as code and are immutable after startup. Prices are
//! USD per million tokens. The catalog version string is logged when the
//! registry is built so deployments can be tied to the prices they used.

use hive_core::{ModelCapability, ModelDescriptor};

/// Version of the shipped catalogs.
pub const CATALOG_VERSION: &str = "2025-07";

fn descriptor(
    provider: &str,
    id: &str,
    name: &str,
    description: &str,
    capabilities: Vec<ModelCapability>,
    context_window: u32,
    input_cost: f64,
    output_cost: f64,
    avg_latency_ms: f64,
    quality_score: f64,
) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        provider: provider.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        is_reasoning: capabilities.contains(&ModelCapability::Reasoning),
        is_multimodal: capabilities.contains(&ModelCapability::Multimodal),
        capabilities,
        context_window,
        input_cost_per_million_tokens: input_cost,
        output_cost_per_million_tokens: output_cost,
        avg_latency_ms: Some(avg_latency_ms),
        quality_score: Some(quality_score),
    }
}

use ModelCapability::*;

pub fn openai_models() -> Vec<ModelDescriptor> {
    vec![
        descriptor(
            "openai",
            "gpt-4o",
            "GPT-4o",
            "Flagship multimodal model",
            vec![TextGeneration, Multimodal, Vision, FunctionCalling, StructuredOutput],
            128_000,
            2.5,
            10.0,
            900.0,
            0.90,
        ),
        descriptor(
            "openai",
            "gpt-4o-mini",
            "GPT-4o mini",
            "Fast, cost-efficient general model",
            vec![TextGeneration, Multimodal, FunctionCalling, StructuredOutput],
            128_000,
            0.15,
            0.6,
            500.0,
            0.78,
        ),
        descriptor(
            "openai",
            "o3-mini",
            "o3-mini",
            "Compact reasoning model",
            vec![TextGeneration, Reasoning, FunctionCalling, StructuredOutput],
            200_000,
            1.1,
            4.4,
            2500.0,
            0.88,
        ),
        descriptor(
            "openai",
            "text-embedding-3-small",
            "Text Embedding 3 Small",
            "Embedding model",
            vec![Embedding],
            8_191,
            0.02,
            0.0,
            200.0,
            0.70,
        ),
    ]
}

pub fn anthropic_models() -> Vec<ModelDescriptor> {
    vec![
        descriptor(
            "anthropic",
            "claude-sonnet-4-20250514",
            "Claude Sonnet 4",
            "Balanced frontier model",
            vec![TextGeneration, Reasoning, Multimodal, Vision, FunctionCalling, LongContext],
            200_000,
            3.0,
            15.0,
            1100.0,
            0.92,
        ),
        descriptor(
            "anthropic",
            "claude-3-5-haiku-20241022",
            "Claude 3.5 Haiku",
            "Fast lightweight model",
            vec![TextGeneration, FunctionCalling],
            200_000,
            0.8,
            4.0,
            450.0,
            0.76,
        ),
    ]
}

pub fn google_models() -> Vec<ModelDescriptor> {
    vec![
        descriptor(
            "google",
            "gemini-2.0-flash",
            "Gemini 2.0 Flash",
            "Fast multimodal model with long context",
            vec![TextGeneration, Multimodal, Vision, FunctionCalling, LongContext],
            1_048_576,
            0.1,
            0.4,
            550.0,
            0.80,
        ),
        descriptor(
            "google",
            "gemini-2.5-pro",
            "Gemini 2.5 Pro",
            "Frontier reasoning model with long context",
            vec![TextGeneration, Reasoning, Multimodal, Vision, FunctionCalling, LongContext],
            1_048_576,
            1.25,
            10.0,
            1800.0,
            0.91,
        ),
    ]
}

pub fn groq_models() -> Vec<ModelDescriptor> {
    vec![
        descriptor(
            "groq",
            "llama-3.1-8b-instant",
            "Llama 3.1 8B Instant",
            "Very low latency open-weights model",
            vec![TextGeneration, FunctionCalling],
            131_072,
            0.05,
            0.08,
            180.0,
            0.62,
        ),
        descriptor(
            "groq",
            "llama-3.3-70b-versatile",
            "Llama 3.3 70B Versatile",
            "Larger open-weights model on fast inference",
            vec![TextGeneration, FunctionCalling],
            131_072,
            0.59,
            0.79,
            320.0,
            0.74,
        ),
    ]
}

pub fn perplexity_models() -> Vec<ModelDescriptor> {
    vec![descriptor(
        "perplexity",
        "sonar",
        "Sonar",
        "Search-grounded answer model",
        vec![TextGeneration, Search],
        127_000,
        1.0,
        1.0,
        1400.0,
        0.72,
    )]
}

pub fn xai_models() -> Vec<ModelDescriptor> {
    vec![descriptor(
        "xai",
        "grok-3-mini",
        "Grok 3 Mini",
        "Compact reasoning model",
        vec![TextGeneration, Reasoning, FunctionCalling],
        131_072,
        0.3,
        0.5,
        1200.0,
        0.75,
    )]
}

pub fn moonshot_models() -> Vec<ModelDescriptor> {
    vec![descriptor(
        "moonshot",
        "kimi-k2",
        "Kimi K2",
        "Long-context general model",
        vec![TextGeneration, FunctionCalling, LongContext],
        131_072,
        0.6,
        2.5,
        1000.0,
        0.79,
    )]
}

pub fn qwen_models() -> Vec<ModelDescriptor> {
    vec![descriptor(
        "qwen",
        "qwen-max",
        "Qwen Max",
        "Flagship general model",
        vec![TextGeneration, FunctionCalling, StructuredOutput],
        32_768,
        1.6,
        6.4,
        950.0,
        0.81,
    )]
}

/// Every shipped descriptor across all providers.
pub fn all_models() -> Vec<ModelDescriptor> {
    let mut out = Vec::new();
    out.extend(openai_models());
    out.extend(anthropic_models());
    out.extend(google_models());
    out.extend(groq_models());
    out.extend(perplexity_models());
    out.extend(xai_models());
    out.extend(moonshot_models());
    out.extend(qwen_models());
    out
}
