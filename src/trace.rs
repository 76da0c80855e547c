//! The record produced by executing a plan: one [`StepTrace`] per step plus
//! the derived [`ExecutionTrace`] summary consumed by the Auditor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in an execution trace: either an executed step, a skipped step,
/// or a malformed/unreachable one. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTrace {
    pub step: usize,
    pub agent: String,
    pub capability: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_used: Option<Value>,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StepTrace {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The full trace of a plan execution, handed to the Auditor and returned
/// verbatim by `POST /execute_plan`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionTrace {
    pub steps: Vec<StepTrace>,
    #[serde(default)]
    pub final_output: Value,
    #[serde(default)]
    pub total_waterdrops_used: f64,
}

/// Find the base URL an agent registered in the trace by searching, in
/// order, `step.input._agent_base_url` then `step.output._agent_base_url`.
/// Returns `None` if neither carries it.
pub fn find_base_url(step: &StepTrace) -> Option<String> {
    let from_input = step
        .input_used
        .as_ref()
        .and_then(|v| v.get("_agent_base_url"))
        .and_then(Value::as_str);
    let from_output = step
        .output
        .get("_agent_base_url")
        .and_then(Value::as_str);
    from_input.or(from_output).map(str::to_string)
}
