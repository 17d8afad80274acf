//! Dynamic prompt generation
//!
//! Assembles the final prompt for an LLM call from a named template, a
//! variables map, the agent's contextual memory, and the target model's
//! preferred format. Rendering is pure: identical inputs produce a
//! byte-identical prompt.

use hive_core::{HiveError, HiveResult};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::memory::ContextualMemory;
use crate::template::PromptTemplate;

/// Model families with distinct prompt conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Claude-family models take Human:/Assistant: turn markers
    Claude,
    /// OpenAI-family and everything else take plain sections
    Plain,
}

/// Detect the family from a model identifier.
pub fn model_family(target_model: &str) -> ModelFamily {
    static CLAUDE: OnceLock<Regex> = OnceLock::new();
    let claude = CLAUDE.get_or_init(|| Regex::new(r"(?i)\bclaude\b|anthropic/").expect("valid regex"));
    if claude.is_match(target_model) {
        ModelFamily::Claude
    } else {
        ModelFamily::Plain
    }
}

/// Registry of named templates plus the assembly logic.
#[derive(Debug, Default)]
pub struct PromptGenerator {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptGenerator {
    /// Generator pre-loaded with the stock templates.
    pub fn new() -> Self {
        let mut generator = Self {
            templates: HashMap::new(),
        };
        generator.register("general", stock_general_template());
        generator.register("research", stock_research_template());
        generator.register("synthesis", stock_synthesis_template());
        generator
    }

    /// Empty generator, for callers that manage their own templates.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register or replace a named template.
    pub fn register(&mut self, name: impl Into<String>, template: PromptTemplate) {
        self.templates.insert(name.into(), template);
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    /// Registered template names, sorted.
    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Build the final prompt.
    pub fn generate(
        &self,
        template_name: &str,
        variables: &HashMap<String, Value>,
        memory: &ContextualMemory,
        agent_role: &str,
        target_model: &str,
    ) -> HiveResult<String> {
        let template = self.templates.get(template_name).ok_or_else(|| {
            HiveError::validation(format!("Template {} not found", template_name))
        })?;

        let mut body = template.render(variables)?;

        let digest = memory.digest();
        if !digest.is_empty() {
            body.push_str("\n\n");
            body.push_str(&digest);
        }
        body.push_str(&format!("\n\nActing role: {}", agent_role));

        Ok(match model_family(target_model) {
            ModelFamily::Claude => format!("Human: {}\n\nAssistant:", body),
            ModelFamily::Plain => body,
        })
    }
}

fn stock_general_template() -> PromptTemplate {
    PromptTemplate::new(
        "You are a capable AI assistant working inside a multi-agent workforce.",
        "{task_description}",
        "{output_format}",
    )
}

fn stock_research_template() -> PromptTemplate {
    PromptTemplate::new(
        "You are a thorough research assistant.",
        "Research the following question and report findings with sources: {question}",
        "Structured findings with a short summary first",
    )
    .with_constraints(vec![
        "Distinguish facts from inference".to_string(),
        "Note uncertainty explicitly".to_string(),
    ])
}

fn stock_synthesis_template() -> PromptTemplate {
    PromptTemplate::new(
        "You are a synthesis editor combining multiple analyst reports.",
        "Integrate the agent responses below into one comprehensive answer:\n{responses}",
        "A single coherent answer that reconciles disagreements",
    )
}
