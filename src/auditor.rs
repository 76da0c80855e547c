//! The Auditor Core: "100% LLM judgment" — the auditor never enforces rules
//! itself. It discovers each agent's policy, asks the LLM to judge the
//! trace against the policies, and coerces the reply into a well-formed
//! result. Grounded on the original project's `agents/auditor/app.py`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AuditorError;
use crate::llm_client::{self, ChatMessage, LlmClient};
use crate::trace::{self, ExecutionTrace, StepTrace};

/// One agent's verdict within an [`AuditResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditDetail {
    pub agent: String,
    pub status: String,
    pub comment: String,
    pub score: f64,
}

/// The coerced, schema-conformant audit verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub status: String,
    pub summary: String,
    pub details: Vec<AuditDetail>,
}

/// Run the full Auditor Core state machine against `trace`.
///
/// Water cost: `6 + 0.5 * nb_steps` (charged by the caller).
pub async fn run(
    trace: &ExecutionTrace,
    llm: &dyn LlmClient,
    policy_timeout: Duration,
    audit_timeout: Duration,
) -> Result<AuditResult, AuditorError> {
    let policies = discover_policies(trace, policy_timeout).await?;
    let compact_trace = compact(&trace.steps);

    let messages = build_messages(&policies, &compact_trace);
    let reply = llm
        .chat(&messages, 0.2, audit_timeout)
        .await
        .map_err(|e| AuditorError::LLMError(e.to_string()))?;

    let raw = llm_client::extract_json(&reply).map_err(|e| AuditorError::LLMError(e.to_string()))?;
    Ok(coerce(&raw))
}

/// Phase A: for every unique agent in the trace, find its base URL and fetch
/// its audit policy. Strict: any missing URL or failed/non-object fetch is
/// fatal for the whole audit.
async fn discover_policies(
    trace: &ExecutionTrace,
    timeout: Duration,
) -> Result<BTreeMap<String, Value>, AuditorError> {
    let client = reqwest::Client::new();
    let mut policies = BTreeMap::new();

    for step in &trace.steps {
        if policies.contains_key(&step.agent) || step.agent.is_empty() {
            continue;
        }

        let base_url = trace::find_base_url(step).ok_or_else(|| {
            AuditorError::PolicyDiscoveryError(format!(
                "step {} ('{}') carries no _agent_base_url",
                step.step, step.agent
            ))
        })?;

        let response = client
            .get(format!("{}/audit_policy", base_url.trim_end_matches('/')))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                AuditorError::PolicyDiscoveryError(format!(
                    "could not fetch audit policy for '{}': {}",
                    step.agent, e
                ))
            })?;

        let policy: Value = response.json().await.map_err(|e| {
            AuditorError::PolicyDiscoveryError(format!(
                "audit policy for '{}' was not valid JSON: {}",
                step.agent, e
            ))
        })?;

        if !policy.is_object() {
            return Err(AuditorError::PolicyDiscoveryError(format!(
                "audit policy for '{}' was not a JSON object",
                step.agent
            )));
        }

        policies.insert(step.agent.clone(), policy);
    }

    Ok(policies)
}

/// One step, compacted for the audit prompt: previews truncate strings to
/// ~800 chars, lists to 10 entries, and maps to 20 keys, recursively.
fn compact(steps: &[StepTrace]) -> Vec<Value> {
    steps
        .iter()
        .map(|s| {
            json!({
                "agent": s.agent,
                "has_error": s.is_error(),
                "input_preview": s.input_used.as_ref().map(preview),
                "output_preview": preview(&s.output),
                "error": s.error,
            })
        })
        .collect()
}

const MAX_STRING_LEN: usize = 800;
const MAX_LIST_LEN: usize = 10;
const MAX_MAP_KEYS: usize = 20;

fn preview(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > MAX_STRING_LEN => {
            let truncated: String = s.chars().take(MAX_STRING_LEN).collect();
            Value::String(format!("{}…", truncated))
        }
        Value::Array(items) => {
            let truncated: Vec<Value> = items.iter().take(MAX_LIST_LEN).map(preview).collect();
            Value::Array(truncated)
        }
        Value::Object(map) => {
            let truncated: serde_json::Map<String, Value> = map
                .iter()
                .take(MAX_MAP_KEYS)
                .map(|(k, v)| (k.clone(), preview(v)))
                .collect();
            Value::Object(truncated)
        }
        other => other.clone(),
    }
}

fn build_messages(policies: &BTreeMap<String, Value>, compact_trace: &[Value]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are an execution auditor. You judge; you do not enforce rules yourself. \
             Given per-agent policies and a compacted execution trace, reply with exactly one \
             JSON object: {\"status\": \"ok\"|\"partial\"|\"fail\", \"summary\": string, \
             \"details\": [{\"agent\": string, \"status\": \"valid\"|\"warning\"|\"fail\", \
             \"comment\": string, \"score\": number between 0 and 1}]}. \
             status is \"fail\" if any detail is \"fail\", \"partial\" if any detail is \
             \"warning\" and none is \"fail\", otherwise \"ok\". No other text.",
        ),
        ChatMessage::user(format!(
            "Policies:\n{}\n\nTrace:\n{}",
            json!(policies),
            json!(compact_trace)
        )),
    ]
}

/// Phase C/D coercion: clamp scores, normalize unknown statuses to
/// `warning`, fill in missing comments/summary, and derive the global status
/// from the details when the LLM omitted or mis-stated it.
fn coerce(raw: &Value) -> AuditResult {
    let details: Vec<AuditDetail> = raw
        .get("details")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(coerce_detail).collect())
        .unwrap_or_default();

    let derived_status = derive_status(&details);
    let status = raw
        .get("status")
        .and_then(Value::as_str)
        .filter(|s| matches!(*s, "ok" | "partial" | "fail"))
        .map(str::to_string)
        .unwrap_or(derived_status);

    let summary = raw
        .get("summary")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let valid = details.iter().filter(|d| d.status == "valid").count();
            format!("{}/{} agents validated", valid, details.len())
        });

    AuditResult {
        status,
        summary,
        details,
    }
}

fn coerce_detail(raw: &Value) -> AuditDetail {
    let agent = raw
        .get("agent")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let status = raw
        .get("status")
        .and_then(Value::as_str)
        .filter(|s| matches!(*s, "valid" | "warning" | "fail"))
        .unwrap_or("warning")
        .to_string();

    let comment = raw
        .get("comment")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "No comment.".to_string());

    let score = raw
        .get("score")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    AuditDetail {
        agent,
        status,
        comment,
        score,
    }
}

fn derive_status(details: &[AuditDetail]) -> String {
    if details.iter().any(|d| d.status == "fail") {
        "fail".to_string()
    } else if details.iter().any(|d| d.status == "warning") {
        "partial".to_string()
    } else {
        "ok".to_string()
    }
}
