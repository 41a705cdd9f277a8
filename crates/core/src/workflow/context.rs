use crate::types::StepId;
use serde_json::{Map, Value};

/// Key under which step outputs are exposed to templates and capabilities
pub const STEP_RESULTS_KEY: &str = "stepResults";

/// Mutable state bag owned by exactly one workflow run.
///
/// Starts as the workflow's initial state merged with the caller's input and
/// accumulates each step's output under `stepResults`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    values: Map<String, Value>,
    step_results: Map<String, Value>,
}

impl RunContext {
    /// An object input is merged over the initial state, `null` is ignored,
    /// anything else is kept under `input`.
    pub fn new(initial_state: &Map<String, Value>, input: Value) -> Self {
        let mut values = initial_state.clone();
        match input {
            Value::Object(map) => values.extend(map),
            Value::Null => {}
            other => {
                values.insert("input".to_string(), other);
            }
        }
        values.remove(STEP_RESULTS_KEY);

        Self {
            values,
            step_results: Map::new(),
        }
    }

    pub fn record(&mut self, step_id: &StepId, output: Value) {
        self.step_results.insert(step_id.to_string(), output);
    }

    pub fn step_result(&self, step_id: &StepId) -> Option<&Value> {
        self.step_results.get(step_id.as_str())
    }

    pub fn step_results(&self) -> &Map<String, Value> {
        &self.step_results
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Look up a dot-separated path; segments index objects by key and
    /// arrays by position.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.').map(str::trim);
        let first = segments.next().filter(|s| !s.is_empty())?;

        let mut current = if first == STEP_RESULTS_KEY {
            match segments.next() {
                Some(step) => self.step_results.get(step)?,
                None => return None,
            }
        } else {
            self.values.get(first)?
        };

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Whole context as one JSON object, step outputs under `stepResults`
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut snapshot = self.values.clone();
        snapshot.insert(
            STEP_RESULTS_KEY.to_string(),
            Value::Object(self.step_results.clone()),
        );
        snapshot
    }

    /// Context overlaid with a step's own input; the step input wins.
    pub fn merged_with(&self, step_input: &Map<String, Value>) -> Value {
        let mut merged = self.snapshot();
        merged.extend(step_input.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(merged)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.snapshot())
    }
}
