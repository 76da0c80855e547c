//! The Executor: sequential step dispatcher.
//!
//! Maintains a rolling "business context" (the last non-meta step's output)
//! and appends one immutable [`StepTrace`] per step. Never raises on agent
//! errors — it records the error in the trace and halts.

use std::time::Duration;

use serde_json::{json, Value};

use crate::plan::{self, ParsedLine};
use crate::registry::AgentRegistry;
use crate::trace::{ExecutionTrace, StepTrace};

/// Execute `plan_text` against a point-in-time snapshot of `registry`.
///
/// Water cost: +0.02 flat per executed plan (charged by the caller), plus
/// whatever water each agent charges itself.
pub async fn execute(
    plan_text: &str,
    registry: &AgentRegistry,
    client: &reqwest::Client,
    timeout: Duration,
) -> ExecutionTrace {
    let snapshot = registry.snapshot().await;
    let lines = plan::parse_lines(plan_text);

    let mut trace = Vec::new();
    let mut context = Value::Null;
    let mut business_context = Value::Null;

    for (index, line) in lines.into_iter().enumerate() {
        let step_number = index + 1;

        let step = match line {
            ParsedLine::Unrecognized(_) => {
                trace.push(StepTrace {
                    step: step_number,
                    agent: String::new(),
                    capability: String::new(),
                    input_used: None,
                    output: Value::Null,
                    error: Some("Unrecognized format".to_string()),
                    skipped: None,
                    reason: None,
                });
                continue;
            }
            ParsedLine::Step(step) => step,
        };

        let Some(record) = snapshot.get(&step.agent) else {
            trace.push(StepTrace {
                step: step_number,
                agent: step.agent.clone(),
                capability: step.capability.clone(),
                input_used: None,
                output: Value::Null,
                error: Some(format!("Agent not registered: {}", step.agent)),
                skipped: None,
                reason: None,
            });
            continue;
        };

        let capability = record.manifest.capability(&step.capability);
        if capability.is_none() {
            trace.push(StepTrace {
                step: step_number,
                agent: step.agent.clone(),
                capability: step.capability.clone(),
                input_used: None,
                output: Value::Null,
                error: None,
                skipped: Some(true),
                reason: Some("Capability not advertised by agent manifest".to_string()),
            });
            continue;
        }

        let is_meta = capability
            .and_then(|c| c.custom_input_handler.as_deref())
            .map(|handler| handler == "use_execution_trace")
            .unwrap_or(false);

        let mut payload_input = if is_meta {
            trace_projection(&trace)
        } else {
            clean_context(&context)
        };
        attach_base_url(&mut payload_input, &record.base_url);

        let outcome = client
            .post(format!("{}/execute", record.base_url.trim_end_matches('/')))
            .json(&json!({ "capability": step.capability, "input": payload_input }))
            .timeout(timeout)
            .send()
            .await;

        let response = match outcome {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                trace.push(StepTrace {
                    step: step_number,
                    agent: step.agent.clone(),
                    capability: step.capability.clone(),
                    input_used: Some(payload_input),
                    output: Value::Null,
                    error: Some(format!("agent returned HTTP {}: {}", status, body)),
                    skipped: None,
                    reason: None,
                });
                break;
            }
            Err(e) => {
                trace.push(StepTrace {
                    step: step_number,
                    agent: step.agent.clone(),
                    capability: step.capability.clone(),
                    input_used: Some(payload_input),
                    output: Value::Null,
                    error: Some(e.to_string()),
                    skipped: None,
                    reason: None,
                });
                break;
            }
        };

        let mut output: Value = response.json().await.unwrap_or(Value::Null);
        attach_base_url(&mut output, &record.base_url);

        trace.push(StepTrace {
            step: step_number,
            agent: step.agent.clone(),
            capability: step.capability.clone(),
            input_used: Some(payload_input),
            output: output.clone(),
            error: None,
            skipped: None,
            reason: None,
        });

        context = output.clone();
        if !is_meta {
            business_context = output;
        }
    }

    let final_output = if business_context.is_null() {
        context
    } else {
        business_context
    };
    let total_waterdrops_used = final_output
        .get("waterdrops_used")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    ExecutionTrace {
        steps: trace,
        final_output,
        total_waterdrops_used,
    }
}

/// Strip the `waterdrops_used` sentinel from the rolling context and wrap
/// non-object contexts as `{"_value": ctx}`; a null context becomes `{}`.
fn clean_context(context: &Value) -> Value {
    match context {
        Value::Null => json!({}),
        Value::Object(map) => {
            let mut cleaned = map.clone();
            cleaned.remove("waterdrops_used");
            Value::Object(cleaned)
        }
        other => json!({ "_value": other }),
    }
}

/// The trace-projection payload for a meta capability: `{steps: [{agent,
/// input, output, error}]}` built from every prior trace entry.
fn trace_projection(prior: &[StepTrace]) -> Value {
    let steps: Vec<Value> = prior
        .iter()
        .map(|s| {
            json!({
                "agent": s.agent,
                "input": s.input_used,
                "output": s.output,
                "error": s.error,
            })
        })
        .collect();
    json!({ "steps": steps })
}

fn attach_base_url(value: &mut Value, base_url: &str) {
    if let Value::Object(map) = value {
        map.insert("_agent_base_url".to_string(), Value::String(base_url.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use axum::{routing::get, routing::post, Json, Router};
    use std::net::SocketAddr;

    /// An in-process stand-in for an agent exposing `/manifest` and
    /// `/execute`, used instead of pulling in a mocking crate (mirrors
    /// `registry.rs`'s `wiremock_stub_server`).
    async fn stub_agent(capability: &str, status_ok: bool, body: Value) -> String {
        let manifest = json!({ "capabilities": [capability] });
        let app = Router::new()
            .route("/manifest", get(move || async move { Json(manifest.clone()) }))
            .route(
                "/execute",
                post(move |_body: Json<Value>| {
                    let body = body.clone();
                    async move {
                        if status_ok {
                            (axum::http::StatusCode::OK, Json(body)).into_response()
                        } else {
                            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
                        }
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn registry_with(name: &str, base_url: &str) -> AgentRegistry {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::new(dir.path().join("agents.json"));
        registry
            .register(name, base_url, Duration::from_secs(5))
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn single_step_success() {
        let base_url = stub_agent("do", true, json!({"ok": true})).await;
        let registry = registry_with("A", &base_url).await;
        let client = reqwest::Client::new();

        let trace = execute("1. A \u{2192} do", &registry, &client, Duration::from_secs(5)).await;

        assert_eq!(trace.steps.len(), 1);
        assert!(trace.steps[0].error.is_none());
        assert_eq!(trace.final_output["ok"], true);
        assert_eq!(trace.final_output["_agent_base_url"], base_url);
    }

    #[tokio::test]
    async fn unknown_agent_is_skipped_not_halted() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::new(dir.path().join("agents.json"));
        let client = reqwest::Client::new();

        let trace = execute("1. Ghost \u{2192} do", &registry, &client, Duration::from_secs(5)).await;

        assert_eq!(trace.steps.len(), 1);
        assert!(trace.steps[0].error.is_some());
    }

    #[tokio::test]
    async fn halts_on_agent_http_failure() {
        let base_url = stub_agent("do", false, json!({})).await;
        let registry = registry_with("A", &base_url).await;
        let client = reqwest::Client::new();

        let trace = execute(
            "1. A \u{2192} do\n2. A \u{2192} do",
            &registry,
            &client,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(trace.steps.len(), 1);
        assert!(trace.steps[0].error.is_some());
    }

    #[tokio::test]
    async fn unadvertised_capability_is_skipped_with_reason() {
        let base_url = stub_agent("do", true, json!({})).await;
        let registry = registry_with("A", &base_url).await;
        let client = reqwest::Client::new();

        let trace = execute("1. A \u{2192} other", &registry, &client, Duration::from_secs(5)).await;

        assert_eq!(trace.steps[0].skipped, Some(true));
    }
}
