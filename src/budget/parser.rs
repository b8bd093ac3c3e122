//! Token usage parsing from agent output.
//!
//! Agents report usage in different shapes:
//!
//! - **Claude CLI / Anthropic**: `{"usage": {"input_tokens": N, "output_tokens": N}}`
//! - **OpenAI**: `{"usage": {"prompt_tokens": N, "completion_tokens": N, "total_tokens": N}}`
//! - **LangChain**: `{"usage_metadata": {"total_tokens": N}}` or
//!   `{"llm_output": {"token_usage": {"total_tokens": N}}}`
//!
//! Streaming agents print one usage object per model call. A line with
//! `"type": "result"` carries the run total and wins over the per-call lines;
//! otherwise the per-call usages are summed.

use serde_json::{Map, Value};

/// Parsed token usage from agent output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTokenUsage {
    /// Input/prompt tokens used
    pub input_tokens: Option<u64>,
    /// Output/completion tokens used
    pub output_tokens: Option<u64>,
    /// Total tokens (if provided separately)
    pub total_tokens: Option<u64>,
    /// Source format ("anthropic", "openai", "langchain")
    pub source: String,
}

impl ParsedTokenUsage {
    fn new(input: Option<u64>, output: Option<u64>, total: Option<u64>, source: &str) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            total_tokens: total,
            source: source.to_string(),
        }
    }

    /// Get total tokens.
    pub fn total(&self) -> u64 {
        self.total_tokens
            .or(match (self.input_tokens, self.output_tokens) {
                (Some(i), Some(o)) => Some(i.saturating_add(o)),
                (Some(i), None) => Some(i),
                (None, Some(o)) => Some(o),
                (None, None) => None,
            })
            .unwrap_or(0)
    }

    fn merge(&mut self, other: &ParsedTokenUsage) {
        fn add(a: Option<u64>, b: Option<u64>) -> Option<u64> {
            match (a, b) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0).saturating_add(b.unwrap_or(0))),
            }
        }
        let total = self.total().saturating_add(other.total());
        self.input_tokens = add(self.input_tokens, other.input_tokens);
        self.output_tokens = add(self.output_tokens, other.output_tokens);
        self.total_tokens = Some(total);
        if self.source.is_empty() {
            self.source = other.source.clone();
        }
    }
}

/// Extracts actual token usage from agent output.
#[derive(Debug, Clone, Default)]
pub struct TokenUsageParser;

impl TokenUsageParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse token usage from agent output.
    ///
    /// Returns `None` if no usage data is found.
    pub fn parse(&self, output: &str) -> Option<ParsedTokenUsage> {
        let mut summed: Option<ParsedTokenUsage> = None;

        for line in output.lines() {
            let line = line.trim();
            if !line.starts_with('{') {
                continue;
            }
            let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            let Some(usage) = self.usage_from_object(&map) else {
                continue;
            };

            if map.get("type").and_then(Value::as_str) == Some("result") {
                return Some(usage);
            }
            match summed.as_mut() {
                Some(acc) => acc.merge(&usage),
                None => summed = Some(usage),
            }
        }

        // Pretty-printed JSON spans lines; fall back to the whole document.
        summed.or_else(|| self.parse_document(output))
    }

    fn parse_document(&self, output: &str) -> Option<ParsedTokenUsage> {
        let start = output.find('{')?;
        let end = output.rfind('}')?;
        if end <= start {
            return None;
        }
        match serde_json::from_str::<Value>(&output[start..=end]) {
            Ok(Value::Object(map)) => self.usage_from_object(&map),
            _ => None,
        }
    }

    fn usage_from_object(&self, map: &Map<String, Value>) -> Option<ParsedTokenUsage> {
        if let Some(Value::Object(usage)) = map.get("usage") {
            if let Some(parsed) = parse_usage_fields(usage) {
                return Some(parsed);
            }
        }

        if let Some(Value::Object(usage)) = map.get("usage_metadata") {
            if let Some(parsed) = parse_usage_fields(usage) {
                return Some(ParsedTokenUsage { source: "langchain".to_string(), ..parsed });
            }
        }

        let token_usage = map
            .get("llm_output")
            .and_then(|llm| llm.get("token_usage"))
            .and_then(Value::as_object);
        if let Some(usage) = token_usage {
            if let Some(parsed) = parse_usage_fields(usage) {
                return Some(ParsedTokenUsage { source: "langchain".to_string(), ..parsed });
            }
        }

        None
    }
}

fn parse_usage_fields(usage: &Map<String, Value>) -> Option<ParsedTokenUsage> {
    let field = |name: &str| usage.get(name).and_then(Value::as_u64);

    if let (Some(input), Some(output)) = (field("input_tokens"), field("output_tokens")) {
        // Cache reads and writes count against input quotas too.
        let cached = field("cache_creation_input_tokens")
            .unwrap_or(0)
            .saturating_add(field("cache_read_input_tokens").unwrap_or(0));
        let input = input.saturating_add(cached);
        let total = field("total_tokens").unwrap_or(input.saturating_add(output));
        return Some(ParsedTokenUsage::new(Some(input), Some(output), Some(total), "anthropic"));
    }

    if let (Some(prompt), Some(completion)) = (field("prompt_tokens"), field("completion_tokens")) {
        let total = field("total_tokens").unwrap_or(prompt.saturating_add(completion));
        return Some(ParsedTokenUsage::new(Some(prompt), Some(completion), Some(total), "openai"));
    }

    field("total_tokens").map(|total| ParsedTokenUsage::new(None, None, Some(total), "total"))
}
