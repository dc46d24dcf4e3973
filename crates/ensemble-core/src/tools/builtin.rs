//! Text processing tools available to every agent without an external server.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolCapability};
use crate::errors::EnsembleError;

pub const TEXT_PROCESSING: &str = "text_processing";

const STOP_WORDS: &[&str] = &["the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for"];

fn text_argument(arguments: &Value) -> &str {
    arguments.get("text").and_then(Value::as_str).unwrap_or("")
}

fn count_argument(
    tool_name: &str,
    arguments: &Value,
    key: &str,
    default: usize,
) -> Result<usize, EnsembleError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| EnsembleError::ToolError {
                tool_name: tool_name.to_string(),
                message: format!("'{}' must be a non-negative integer, got {}", key, value),
            }),
    }
}

pub struct TextSummarizeTool;

impl TextSummarizeTool {
    pub const NAME: &'static str = "text_summarize";
    const DEFAULT_MAX_LENGTH: usize = 200;

    pub fn new() -> Self {
        Self
    }
}

impl Default for TextSummarizeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextSummarizeTool {
    fn capability(&self) -> ToolCapability {
        ToolCapability::builtin(
            Self::NAME,
            "Summarize a long text into key points",
            TEXT_PROCESSING,
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to summarize"},
                    "max_length": {"type": "integer", "description": "Maximum summary length"}
                },
                "required": ["text"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<Value, EnsembleError> {
        let text = text_argument(&arguments);
        let max_length =
            count_argument(Self::NAME, &arguments, "max_length", Self::DEFAULT_MAX_LENGTH)?;

        if text.chars().count() > max_length {
            let mut summary: String = text.chars().take(max_length).collect();
            summary.push_str("...");
            Ok(Value::String(summary))
        } else {
            Ok(Value::String(text.to_string()))
        }
    }
}

pub struct TextExtractKeywordsTool;

impl TextExtractKeywordsTool {
    pub const NAME: &'static str = "text_extract_keywords";
    const DEFAULT_COUNT: usize = 5;

    pub fn new() -> Self {
        Self
    }
}

impl Default for TextExtractKeywordsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextExtractKeywordsTool {
    fn capability(&self) -> ToolCapability {
        ToolCapability::builtin(
            Self::NAME,
            "Extract keywords from text",
            TEXT_PROCESSING,
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to analyze"},
                    "count": {"type": "integer", "description": "Number of keywords to extract"}
                },
                "required": ["text"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<Value, EnsembleError> {
        let text = text_argument(&arguments).to_lowercase();
        let count = count_argument(Self::NAME, &arguments, "count", Self::DEFAULT_COUNT)?;

        // First-seen order is kept for words with equal frequency.
        let mut frequencies: Vec<(&str, usize)> = Vec::new();
        for word in text
            .split_whitespace()
            .filter(|w| !STOP_WORDS.contains(w) && w.chars().count() > 3)
        {
            match frequencies.iter_mut().find(|(seen, _)| *seen == word) {
                Some((_, n)) => *n += 1,
                None => frequencies.push((word, 1)),
            }
        }
        frequencies.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(Value::Array(
            frequencies
                .into_iter()
                .take(count)
                .map(|(word, _)| Value::String(word.to_string()))
                .collect(),
        ))
    }
}
