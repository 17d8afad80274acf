//! Prompt templates with `{name}` placeholder substitution

use hive_core::{HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Structured prompt template. Sections render in a fixed order; empty
/// sections are omitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptTemplate {
    /// Who the model is for this task
    pub role: String,

    /// What to do
    pub task: String,

    /// Expected output shape
    pub format: String,

    /// Optional background section
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Ordered constraints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,

    /// Ordered worked examples
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl PromptTemplate {
    pub fn new(
        role: impl Into<String>,
        task: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            task: task.into(),
            format: format.into(),
            context: None,
            constraints: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_examples(mut self, examples: Vec<String>) -> Self {
        self.examples = examples;
        self
    }

    /// Render the template sections with placeholder substitution.
    ///
    /// Section order is role, task, format, context, constraints,
    /// examples. An unbound `{placeholder}` fails with a Validation
    /// error naming the key.
    pub fn render(&self, variables: &HashMap<String, Value>) -> HiveResult<String> {
        let mut sections = Vec::new();
        sections.push(substitute(&self.role, variables)?);
        sections.push(format!("Task: {}", substitute(&self.task, variables)?));
        sections.push(format!("Format: {}", substitute(&self.format, variables)?));

        if let Some(context) = &self.context {
            sections.push(format!("Context: {}", substitute(context, variables)?));
        }
        if !self.constraints.is_empty() {
            let mut lines = vec!["Constraints:".to_string()];
            for constraint in &self.constraints {
                lines.push(format!("- {}", substitute(constraint, variables)?));
            }
            sections.push(lines.join("\n"));
        }
        if !self.examples.is_empty() {
            let mut lines = vec!["Examples:".to_string()];
            for (idx, example) in self.examples.iter().enumerate() {
                lines.push(format!("{}. {}", idx + 1, substitute(example, variables)?));
            }
            sections.push(lines.join("\n"));
        }

        Ok(sections.join("\n\n"))
    }
}

/// Substitute `{name}` placeholders from the variables map. `{{` and
/// `}}` escape literal braces.
pub fn substitute(text: &str, variables: &HashMap<String, Value>) -> HiveResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => {
                            return Err(HiveError::validation(format!(
                                "Unterminated placeholder '{{{}' in template",
                                name
                            )))
                        }
                    }
                }
                let value = variables.get(&name).ok_or_else(|| {
                    HiveError::validation(format!("Unbound template placeholder '{}'", name))
                        .with_details(serde_json::json!({ "placeholder": name }))
                })?;
                out.push_str(&value_text(value)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn value_text(value: &Value) -> HiveResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err(HiveError::validation(
            "Template variable was null; placeholders require a concrete value",
        )),
        other => serde_json::to_string(other)
            .map_err(|e| HiveError::validation(format!("Unserializable template variable: {}", e))),
    }
}
