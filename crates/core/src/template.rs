// Placeholder resolution for step inputs

use crate::workflow::context::RunContext;
use serde_json::{Map, Value};

/// Resolves `{{path}}` placeholders in step inputs against a run context
pub struct TemplateProcessor;

impl TemplateProcessor {
    /// Resolve every placeholder in a step's input map
    pub fn resolve(input: &Map<String, Value>, context: &RunContext) -> Map<String, Value> {
        input
            .iter()
            .map(|(key, value)| (key.clone(), Self::resolve_value(value, context)))
            .collect()
    }

    /// Resolve placeholders inside any JSON value, recursing into containers
    pub fn resolve_value(value: &Value, context: &RunContext) -> Value {
        match value {
            Value::String(text) => Self::resolve_string(text, context),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| Self::resolve_value(item, context))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(Self::resolve(map, context)),
            other => other.clone(),
        }
    }

    /// A string that is exactly one placeholder keeps the referenced value's
    /// type; otherwise placeholders are rendered into the text.
    fn resolve_string(text: &str, context: &RunContext) -> Value {
        let spans = placeholder_spans(text);
        if spans.is_empty() {
            return Value::String(text.to_string());
        }

        if let [(0, end, path)] = spans.as_slice() {
            if *end == text.len() {
                return match context.lookup(path) {
                    Some(value) => value.clone(),
                    None => {
                        tracing::debug!(path = %path, "Unresolved placeholder left as-is");
                        Value::String(text.to_string())
                    }
                };
            }
        }

        let mut rendered = String::with_capacity(text.len());
        let mut last = 0;
        for (start, end, path) in spans {
            rendered.push_str(&text[last..start]);
            match context.lookup(path) {
                Some(Value::String(s)) => rendered.push_str(s),
                Some(other) => rendered.push_str(&other.to_string()),
                None => {
                    tracing::debug!(path = %path, "Unresolved placeholder left as-is");
                    rendered.push_str(&text[start..end]);
                }
            }
            last = end;
        }
        rendered.push_str(&text[last..]);

        Value::String(rendered)
    }

    /// Extract distinct placeholder paths from a template string
    pub fn extract_placeholders(text: &str) -> Vec<String> {
        let mut paths: Vec<String> = placeholder_spans(text)
            .into_iter()
            .map(|(_, _, path)| path.to_string())
            .collect();

        paths.sort();
        paths.dedup();
        paths
    }
}

/// Byte ranges of `{{ ... }}` tokens with their trimmed, non-empty paths
fn placeholder_spans(text: &str) -> Vec<(usize, usize, &str)> {
    let mut spans = Vec::new();
    let mut offset = 0;

    while let Some(open) = text[offset..].find("{{") {
        let start = offset + open;
        let Some(close) = text[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + close + 2;
        let path = text[start + 2..end - 2].trim();
        if !path.is_empty() {
            spans.push((start, end, path));
        }
        offset = end;
    }

    spans
}
