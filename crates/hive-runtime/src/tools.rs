//! Analysis tools available to agents
//!
//! A small registry of built-in tools exposed through function-calling
//! schemas. Tool failures are returned as values inside the result
//! payload, never as transport errors, so an agent can observe and
//! recover from them.

use async_trait::async_trait;
use hive_core::{HiveError, HiveResult};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One callable tool.
#[async_trait]
pub trait AnalysisTool: Send + Sync {
    /// Tool name used in function calls.
    fn name(&self) -> &str;

    /// One-line description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the parameters.
    fn parameters(&self) -> Value;

    /// Execute with JSON arguments.
    async fn execute(&self, args: &Value) -> HiveResult<Value>;
}

/// Registry of the built-in tool set.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AnalysisTool>>,
}

impl ToolRegistry {
    /// Registry with the standard tools.
    pub fn new() -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };
        registry.register(Arc::new(CalculatorTool));
        registry.register(Arc::new(FileReadTool::default()));
        registry.register(Arc::new(TaskCompletionTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn AnalysisTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AnalysisTool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Function-calling schemas for every registered tool.
    pub fn function_schemas(&self) -> Vec<Value> {
        let mut schemas: Vec<Value> = self
            .tools
            .values()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters(),
                    }
                })
            })
            .collect();
        schemas.sort_by_key(|s| {
            s.pointer("/function/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        });
        schemas
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, args: &Value) -> HiveResult<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| HiveError::not_found(format!("tool '{}'", name)))?;
        tool.execute(args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Arithmetic expression evaluator: `+ - * / **`, parentheses, unary
/// minus, sqrt/abs/min/max/round, and the constants pi/e.
pub struct CalculatorTool;

#[async_trait]
impl AnalysisTool for CalculatorTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression and return the numeric result"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expression to evaluate, e.g. '2 + 3 * 4' or 'sqrt(16)'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: &Value) -> HiveResult<Value> {
        let expression = args
            .get("expression")
            .and_then(Value::as_str)
            .or_else(|| args.as_str())
            .ok_or_else(|| HiveError::validation("calculate requires an 'expression' string"))?;

        match evaluate_value(expression) {
            Ok(result) => Ok(json!({
                "expression": expression,
                "result": result.to_json(),
            })),
            Err(message) => Ok(json!({
                "expression": expression,
                "error": message,
            })),
        }
    }
}

/// Calculator result, keeping the numeric kind: integer arithmetic
/// yields an integer, floating operations (division, sqrt, float
/// literals) yield a float even when the value is integral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Number::Int(i) => json!(i),
            Number::Float(f) => json!(f),
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            Number::Int(_) => true,
            Number::Float(f) => f.is_finite(),
        }
    }

    fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_add(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 + b as f64)),
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }

    fn sub(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_sub(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 - b as f64)),
            (a, b) => Number::Float(a.as_f64() - b.as_f64()),
        }
    }

    fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_mul(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 * b as f64)),
            (a, b) => Number::Float(a.as_f64() * b.as_f64()),
        }
    }

    /// True division: always a float.
    fn div(self, other: Number) -> Result<Number, String> {
        if other.as_f64() == 0.0 {
            return Err("division by zero".to_string());
        }
        Ok(Number::Float(self.as_f64() / other.as_f64()))
    }

    /// Integer base with a non-negative integer exponent stays an
    /// integer; anything else goes through powf.
    fn pow(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(base), Number::Int(exp)) if (0..=u32::MAX as i64).contains(&exp) => base
                .checked_pow(exp as u32)
                .map(Number::Int)
                .unwrap_or(Number::Float((base as f64).powf(exp as f64))),
            (a, b) => Number::Float(a.as_f64().powf(b.as_f64())),
        }
    }

    fn neg(self) -> Number {
        match self {
            Number::Int(i) => i
                .checked_neg()
                .map(Number::Int)
                .unwrap_or(Number::Float(-(i as f64))),
            Number::Float(f) => Number::Float(-f),
        }
    }
}

/// Evaluate an arithmetic expression, preserving the numeric kind.
/// Errors are plain strings so the tool can surface them as values.
pub fn evaluate_value(expression: &str) -> Result<Number, String> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!(
            "unexpected trailing input at token {}",
            parser.pos + 1
        ));
    }
    if !value.is_finite() {
        return Err("expression did not evaluate to a finite number".to_string());
    }
    Ok(value)
}

/// [`evaluate_value`] flattened to f64, for callers that only need the
/// magnitude.
pub fn evaluate(expression: &str) -> Result<f64, String> {
    evaluate_value(expression).map(|n| n.as_f64())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // A decimal point makes the literal a float.
                let number = if literal.contains('.') {
                    Number::Float(
                        literal
                            .parse()
                            .map_err(|_| format!("invalid number '{}'", literal))?,
                    )
                } else {
                    Number::Int(
                        literal
                            .parse()
                            .map_err(|_| format!("invalid number '{}'", literal))?,
                    )
                };
                tokens.push(Token::Number(number));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::Power);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(format!("expected {:?}, found {:?}", expected, other)),
        }
    }

    fn parse_expression(&mut self) -> Result<Number, String> {
        let mut value = self.parse_term()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.next();
                    value = value.add(self.parse_term()?);
                }
                Token::Minus => {
                    self.next();
                    value = value.sub(self.parse_term()?);
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<Number, String> {
        let mut value = self.parse_power()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.next();
                    value = value.mul(self.parse_power()?);
                }
                Token::Slash => {
                    self.next();
                    let divisor = self.parse_power()?;
                    value = value.div(divisor)?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // Right-associative.
    fn parse_power(&mut self) -> Result<Number, String> {
        let base = self.parse_unary()?;
        if self.peek() == Some(&Token::Power) {
            self.next();
            let exponent = self.parse_power()?;
            return Ok(base.pow(exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Number, String> {
        if self.peek() == Some(&Token::Minus) {
            self.next();
            return Ok(self.parse_unary()?.neg());
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Number, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "pi" => Ok(Number::Float(std::f64::consts::PI)),
                "e" => Ok(Number::Float(std::f64::consts::E)),
                "sqrt" | "abs" | "round" | "min" | "max" => {
                    self.expect(Token::LParen)?;
                    let mut args = vec![self.parse_expression()?];
                    while self.peek() == Some(&Token::Comma) {
                        self.next();
                        args.push(self.parse_expression()?);
                    }
                    self.expect(Token::RParen)?;
                    apply_function(&name, &args)
                }
                other => Err(format!("unknown identifier '{}'", other)),
            },
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

fn apply_function(name: &str, args: &[Number]) -> Result<Number, String> {
    let unary = |args: &[Number]| -> Result<Number, String> {
        match args {
            [x] => Ok(*x),
            _ => Err(format!("{} takes exactly one argument", name)),
        }
    };
    match name {
        // sqrt is a floating operation even on perfect squares.
        "sqrt" => {
            let x = unary(args)?.as_f64();
            if x < 0.0 {
                return Err("sqrt of a negative number".to_string());
            }
            Ok(Number::Float(x.sqrt()))
        }
        "abs" => Ok(match unary(args)? {
            Number::Int(i) => i
                .checked_abs()
                .map(Number::Int)
                .unwrap_or(Number::Float((i as f64).abs())),
            Number::Float(f) => Number::Float(f.abs()),
        }),
        // round yields an integer, like the usual one-argument form.
        "round" => {
            let rounded = unary(args)?.as_f64().round();
            if rounded.abs() <= i64::MAX as f64 {
                Ok(Number::Int(rounded as i64))
            } else {
                Ok(Number::Float(rounded))
            }
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(format!("{} requires at least one argument", name));
            }
            let pick = args
                .iter()
                .copied()
                .reduce(|a, b| {
                    let better = if name == "min" {
                        b.as_f64() < a.as_f64()
                    } else {
                        b.as_f64() > a.as_f64()
                    };
                    if better {
                        b
                    } else {
                        a
                    }
                })
                .expect("args is non-empty");
            Ok(pick)
        }
        _ => Err(format!("unknown function '{}'", name)),
    }
}

// ---------------------------------------------------------------------------
// File read
// ---------------------------------------------------------------------------

/// Size-capped text file reader.
pub struct FileReadTool {
    max_bytes: usize,
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024,
        }
    }
}

#[async_trait]
impl AnalysisTool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a local text file (truncated to the size cap)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to read"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Value) -> HiveResult<Value> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| HiveError::validation("read_file requires a 'path' string"))?;

        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let truncated = content.len() > self.max_bytes;
                let mut content = content;
                if truncated {
                    content.truncate(self.max_bytes);
                }
                Ok(json!({
                    "path": path,
                    "content": content,
                    "truncated": truncated,
                }))
            }
            Err(e) => Ok(json!({
                "path": path,
                "error": e.to_string(),
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Task completion
// ---------------------------------------------------------------------------

/// Marker tool agents call to signal a finished task.
pub struct TaskCompletionTool;

#[async_trait]
impl AnalysisTool for TaskCompletionTool {
    fn name(&self) -> &str {
        "mark_task_complete"
    }

    fn description(&self) -> &str {
        "Mark the current task as complete with a summary"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_summary": {"type": "string"},
                "completion_message": {"type": "string"}
            },
            "required": ["task_summary"]
        })
    }

    async fn execute(&self, args: &Value) -> HiveResult<Value> {
        let summary = args
            .get("task_summary")
            .and_then(Value::as_str)
            .ok_or_else(|| HiveError::validation("mark_task_complete requires 'task_summary'"))?;
        Ok(json!({
            "status": "completed",
            "summary": summary,
            "message": args.get("completion_message").cloned().unwrap_or(Value::Null),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calculator_precedence() {
        let calc = CalculatorTool;
        let result = calc.execute(&json!({"expression": "2 + 3 * 4"})).await.unwrap();
        // Integer arithmetic renders as a JSON integer.
        assert_eq!(result["result"], json!(14));
    }

    #[tokio::test]
    async fn test_calculator_functions() {
        let calc = CalculatorTool;
        // sqrt is a floating operation: 4.0, not the integer 4.
        let result = calc.execute(&json!({"expression": "sqrt(16)"})).await.unwrap();
        assert_eq!(result["result"], json!(4.0));

        let result = calc.execute(&json!({"expression": "abs(-42)"})).await.unwrap();
        assert_eq!(result["result"], json!(42));

        let result = calc.execute(&json!({"expression": "10 ** 2"})).await.unwrap();
        assert_eq!(result["result"], json!(100));

        let result = calc
            .execute(&json!({"expression": "max(1, 2, 3) + min(4, 5)"}))
            .await
            .unwrap();
        assert_eq!(result["result"], json!(7));
    }

    #[tokio::test]
    async fn test_calculator_division_is_float() {
        let calc = CalculatorTool;
        // True division yields a float even when it comes out even.
        let result = calc.execute(&json!({"expression": "6 / 2"})).await.unwrap();
        assert_eq!(result["result"], json!(3.0));

        let result = calc.execute(&json!({"expression": "7 / 2"})).await.unwrap();
        assert_eq!(result["result"], json!(3.5));

        // A float literal makes the whole expression float.
        let result = calc.execute(&json!({"expression": "1.0 + 2"})).await.unwrap();
        assert_eq!(result["result"], json!(3.0));
    }

    #[tokio::test]
    async fn test_calculator_invalid_expression_returns_error_value() {
        let calc = CalculatorTool;
        let result = calc
            .execute(&json!({"expression": "invalid_expression"}))
            .await
            .unwrap();
        assert!(result.get("error").and_then(Value::as_str).is_some());

        let result = calc.execute(&json!({"expression": "1 / 0"})).await.unwrap();
        assert!(result.get("error").is_some());
    }

    #[test]
    fn test_evaluate_details() {
        assert_eq!(evaluate("2 + 3").unwrap(), 5.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("-3 + 5").unwrap(), 2.0);
        assert_eq!(evaluate("2 ** 3 ** 2").unwrap(), 512.0); // right-assoc
        assert!((evaluate("pi").unwrap() - std::f64::consts::PI).abs() < 1e-12);
        assert!(evaluate("").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("sqrt(-1)").is_err());
    }

    #[test]
    fn test_evaluate_value_preserves_numeric_kind() {
        assert_eq!(evaluate_value("2 + 3").unwrap(), Number::Int(5));
        assert_eq!(evaluate_value("2 ** 10").unwrap(), Number::Int(1024));
        assert_eq!(evaluate_value("round(2.6)").unwrap(), Number::Int(3));

        assert_eq!(evaluate_value("sqrt(16)").unwrap(), Number::Float(4.0));
        assert_eq!(evaluate_value("6 / 2").unwrap(), Number::Float(3.0));
        assert_eq!(evaluate_value("2 ** -1").unwrap(), Number::Float(0.5));
        assert_eq!(evaluate_value("2.0 * 2").unwrap(), Number::Float(4.0));

        // min/max keep the kind of the winning operand.
        assert_eq!(evaluate_value("min(1, 2.5)").unwrap(), Number::Int(1));
        assert_eq!(evaluate_value("max(1, 2.5)").unwrap(), Number::Float(2.5));
    }

    #[tokio::test]
    async fn test_registry_has_core_tools() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.names(),
            vec!["calculate", "mark_task_complete", "read_file"]
        );

        for schema in registry.function_schemas() {
            assert_eq!(schema["type"], "function");
            assert!(schema.pointer("/function/name").is_some());
            assert!(schema.pointer("/function/description").is_some());
            assert!(schema.pointer("/function/parameters").is_some());
        }
    }

    #[tokio::test]
    async fn test_registry_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", &json!({})).await.unwrap_err();
        assert_eq!(err.kind, hive_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_task_completion_tool() {
        let tool = TaskCompletionTool;
        let result = tool
            .execute(&json!({
                "task_summary": "Test task completed",
                "completion_message": "Test message"
            }))
            .await
            .unwrap();
        assert_eq!(result["status"], "completed");
        assert_eq!(result["summary"], "Test task completed");
        assert_eq!(result["message"], "Test message");
        assert!(result.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn test_file_read_missing_file_is_error_value() {
        let tool = FileReadTool::default();
        let result = tool
            .execute(&json!({"path": "/definitely/not/here.txt"}))
            .await
            .unwrap();
        assert!(result.get("error").is_some());
    }
}
