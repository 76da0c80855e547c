//! The Planner: feasibility gate, LLM plan generation, strict parsing, and
//! schema-driven validation/repair against the catalog.
//!
//! State machine (per request): `Idle -> CollectCatalog -> FeasibilityGate ->
//! Generate -> Parse -> ValidateRepair -> Emit | Reject`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::catalog::{self, Catalog};
use crate::config::ClearFlowConfig;
use crate::error::OrchestratorError;
use crate::llm_client::{ChatMessage, LlmClient};
use crate::plan::{self, Step};
use crate::registry::AgentRegistry;

/// Run the full Planner state machine for `goal` against a snapshot of
/// `registry`, returning canonical plan text.
///
/// Water cost: +1 (charged by the caller).
pub async fn plan(
    goal: &str,
    registry: &AgentRegistry,
    llm: &dyn LlmClient,
    config: &ClearFlowConfig,
) -> Result<String, OrchestratorError> {
    let snapshot = registry.snapshot().await;
    let catalog = Catalog::build(&snapshot);

    if !feasibility_gate(goal, &catalog, llm, config.llm_feasibility_timeout).await {
        return Err(OrchestratorError::FeasibilityRefused(
            "goal judged infeasible against the current catalog".to_string(),
        ));
    }

    let raw_plan = generate(goal, &catalog, llm, config.llm_planning_timeout).await?;
    let steps = plan::parse(&raw_plan);
    let repaired = validate_and_repair(&catalog, steps);

    if repaired.is_empty() {
        return Err(OrchestratorError::NoExecutableSteps(
            "no executable steps remained after validation and repair".to_string(),
        ));
    }

    Ok(plan::render(&repaired))
}

/// Ask the LLM a single yes/no question about whether `goal` can be served by
/// the current catalog. Any parse failure or API error is treated
/// conservatively as infeasible.
async fn feasibility_gate(
    goal: &str,
    catalog: &Catalog,
    llm: &dyn LlmClient,
    timeout: Duration,
) -> bool {
    let messages = [
        ChatMessage::system(
            "You judge feasibility only. Given a JSON capability catalog and a goal, \
             reply with exactly one JSON object: {\"feasible\": true} or {\"feasible\": false}. \
             No other text.",
        ),
        ChatMessage::user(format!(
            "Catalog:\n{}\n\nGoal: {}",
            catalog.to_compact_json(),
            goal
        )),
    ];

    let reply = match llm.chat(&messages, 0.0, timeout).await {
        Ok(text) => text,
        Err(_) => return false,
    };

    match crate::llm_client::extract_json(&reply) {
        Ok(value) => value.get("feasible").and_then(Value::as_bool).unwrap_or(false),
        Err(_) => false,
    }
}

/// Ask the LLM to generate plan text for `goal`. Returns
/// [`OrchestratorError::UnsupportedGoal`] if the LLM explicitly declines.
async fn generate(
    goal: &str,
    catalog: &Catalog,
    llm: &dyn LlmClient,
    timeout: Duration,
) -> Result<String, OrchestratorError> {
    let messages = [
        ChatMessage::system(
            "You plan multi-agent pipelines. Rules:\n\
             1. Use only agent and capability names present in the catalog.\n\
             2. Output only numbered steps in the form \"N. <agent> \u{2192} <capability>\".\n\
             3. If an audit capability exists in the catalog, include it exactly once, \
                as the final step.\n\
             4. If the goal cannot be served by the catalog, reply with exactly \
                \"UNSUPPORTED | <reason>\" and nothing else.",
        ),
        ChatMessage::user(format!(
            "Catalog:\n{}\n\nGoal: {}",
            catalog.to_compact_json(),
            goal
        )),
    ];

    let reply = llm
        .chat(&messages, 0.2, timeout)
        .await
        .map_err(|e| OrchestratorError::LLMError(e.to_string()))?;

    let trimmed = reply.trim();
    if let Some(rest) = trimmed.strip_prefix("UNSUPPORTED") {
        let reason = rest.trim_start_matches('|').trim();
        let reason = if reason.is_empty() {
            "the LLM declined the goal".to_string()
        } else {
            reason.to_string()
        };
        return Err(OrchestratorError::UnsupportedGoal(reason));
    }

    Ok(reply)
}

/// Drop pairs absent from the catalog, repair spec-incompatible
/// consecutive steps by substitution or removal, and ensure exactly one
/// terminal audit step when the catalog advertises one.
fn validate_and_repair(catalog: &Catalog, steps: Vec<Step>) -> Vec<Step> {
    let known: Vec<Step> = steps
        .into_iter()
        .filter(|s| catalog.has(&s.agent, &s.capability))
        .collect();

    let repaired = if !catalog.any_agent_declares_specs() {
        known
    } else {
        repair_spec_chain(catalog, known)
    };

    ensure_terminal_audit(catalog, repaired)
}

fn repair_spec_chain(catalog: &Catalog, steps: Vec<Step>) -> Vec<Step> {
    let mut repaired = Vec::with_capacity(steps.len());
    let mut prev_output: Option<Value> = None;

    for (index, step) in steps.into_iter().enumerate() {
        if index == 0 {
            prev_output = output_spec_of(catalog, &step.agent);
            repaired.push(step);
            continue;
        }

        let curr_input = input_spec_of(catalog, &step.agent);
        let ok = match (&prev_output, &curr_input) {
            (None, None) => true,
            (Some(p), Some(c)) => catalog::compatible(p, c),
            _ => false,
        };

        if ok {
            prev_output = output_spec_of(catalog, &step.agent);
            repaired.push(step);
            continue;
        }

        let reference = prev_output.clone().unwrap_or(Value::Null);
        if let Some(substitute) =
            catalog.find_compatible_substitute(&step.capability, &step.agent, &reference)
        {
            prev_output = output_spec_of(catalog, &substitute);
            repaired.push(Step {
                agent: substitute,
                capability: step.capability,
            });
        }
        // Otherwise the step is dropped; `prev_output` carries forward unchanged.
    }

    repaired
}

fn ensure_terminal_audit(catalog: &Catalog, mut steps: Vec<Step>) -> Vec<Step> {
    if let Some((agent, capability)) = catalog.audit_step() {
        let already_present = steps
            .iter()
            .any(|s| s.agent == agent && s.capability == capability);
        if !already_present {
            steps.push(Step { agent, capability });
        }
    }
    steps
}

fn output_spec_of(catalog: &Catalog, agent: &str) -> Option<Value> {
    catalog.agents.get(agent).and_then(|a| a.output_spec.clone())
}

fn input_spec_of(catalog: &Catalog, agent: &str) -> Option<Value> {
    catalog.agents.get(agent).and_then(|a| a.input_spec.clone())
}

/// Convenience constructor for the [`crate::llm_client::HttpLlmClient`] the
/// binaries wire up at startup, sharing it behind an `Arc` the same way the
/// registry is shared.
pub fn shared_llm_client(config: &ClearFlowConfig, model: &str) -> Arc<dyn LlmClient> {
    let token = crate::llm_client::load_secret(&config.llm_secret_path, "mistral");
    Arc::new(crate::llm_client::HttpLlmClient::new(
        config.llm_endpoint.clone(),
        model.to_string(),
        token,
    ))
}
