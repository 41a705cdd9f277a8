// Demo capabilities available to workflows run from the command line

use serde_json::{json, Value};
use stepwise_core::workflow::context::STEP_RESULTS_KEY;
use stepwise_core::{from_fn, CallToolResult, CapabilityKind, CapabilityTable};

/// `echo` returns its input without the accumulated step results,
/// `fail` returns an error result, `noop` returns an empty object.
pub fn capability_table() -> CapabilityTable {
    let mut table = CapabilityTable::new();
    table
        .register(
            CapabilityKind::Tool,
            "echo",
            from_fn(|mut input: Value| async move {
                if let Value::Object(map) = &mut input {
                    map.remove(STEP_RESULTS_KEY);
                }
                Ok(CallToolResult::json(input))
            }),
        )
        .register(
            CapabilityKind::Tool,
            "fail",
            from_fn(|input: Value| async move {
                let message = input
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Step failed on request");
                Ok(CallToolResult::error(message))
            }),
        )
        .register(
            CapabilityKind::Module,
            "noop",
            from_fn(|_| async { Ok(CallToolResult::json(json!({}))) }),
        );
    table
}
