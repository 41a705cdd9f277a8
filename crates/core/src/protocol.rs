// Result shape shared by capabilities and engines

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of invoking a capability or engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: None,
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            content: vec![ToolContent::Json { value }],
            is_error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(message)],
            is_error: Some(true),
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    /// Message of a failed invocation: its first text content.
    pub fn error_message(&self) -> String {
        self.content
            .iter()
            .find_map(|c| match c {
                ToolContent::Text { text } => Some(text.clone()),
                ToolContent::Json { .. } => None,
            })
            .unwrap_or_else(|| "Unknown error".to_string())
    }

    /// Collapse the content into a single JSON value.
    ///
    /// A lone item becomes its value (text that parses as JSON is parsed),
    /// several items become an array.
    pub fn output_value(&self) -> Value {
        let mut values: Vec<Value> = self.content.iter().map(ToolContent::to_value).collect();
        match values.len() {
            0 => Value::Null,
            1 => values.remove(0),
            _ => Value::Array(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text { text: String },
    Json { value: Value },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Text { text } => {
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
            }
            Self::Json { value } => value.clone(),
        }
    }
}
