//! The capability catalog: a derived, read-only view of the registry.
//!
//! The catalog is the only artifact handed to the LLM and to the Planner's
//! validator/repairer — agents never expose anything to the Planner beyond
//! what their manifest already declares. It is rebuilt deterministically from
//! a registry snapshot and never mutated in place.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::manifest::Capability;
use crate::registry::AgentRecord;

/// Capability metadata surfaced to the Planner beyond the bare name.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityMeta {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_input_handler: Option<String>,
}

/// One agent's entry in the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogAgent {
    pub capabilities: Vec<String>,
    pub capability_meta: HashMap<String, CapabilityMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_spec: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_spec: Option<Value>,
}

/// The catalog itself: every agent's advertised surface, keyed by name.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub agents: HashMap<String, CatalogAgent>,
}

impl Catalog {
    /// Build a catalog from a point-in-time registry snapshot.
    pub fn build(snapshot: &HashMap<String, AgentRecord>) -> Self {
        let agents = snapshot
            .iter()
            .map(|(name, record)| (name.clone(), catalog_agent(&record.manifest.capabilities, record)))
            .collect();
        Self { agents }
    }

    /// `true` if `agent` advertises `capability`.
    pub fn has(&self, agent: &str, capability: &str) -> bool {
        self.agents
            .get(agent)
            .map(|a| a.capabilities.iter().any(|c| c == capability))
            .unwrap_or(false)
    }

    /// `true` if at least one agent in the catalog declares an `output_spec`
    /// or `input_spec` — used to decide whether spec-based repair applies at
    /// all.
    pub fn any_agent_declares_specs(&self) -> bool {
        self.agents
            .values()
            .any(|a| a.input_spec.is_some() || a.output_spec.is_some())
    }

    /// Find another agent (other than `exclude`) that advertises
    /// `capability` and whose `input_spec` is compatible with `prev_output`.
    pub fn find_compatible_substitute(
        &self,
        capability: &str,
        exclude: &str,
        prev_output: &Value,
    ) -> Option<String> {
        self.agents
            .iter()
            .find(|(name, agent)| {
                name.as_str() != exclude
                    && agent.capabilities.iter().any(|c| c == capability)
                    && agent
                        .input_spec
                        .as_ref()
                        .map(|spec| compatible(prev_output, spec))
                        .unwrap_or(false)
            })
            .map(|(name, _)| name.clone())
    }

    /// The first agent/capability pair in the catalog recognized as the
    /// terminal audit step, per the same rule the Planner uses to detect one
    /// in a manifest (name `audit_trace`, handler
    /// `use_execution_trace`, or name containing `audit`).
    pub fn audit_step(&self) -> Option<(String, String)> {
        for (name, agent) in &self.agents {
            for cap in &agent.capabilities {
                let meta = agent.capability_meta.get(cap);
                let is_audit = cap == "audit_trace"
                    || meta
                        .and_then(|m| m.custom_input_handler.as_deref())
                        .map(|h| h == "use_execution_trace")
                        .unwrap_or(false)
                    || cap.contains("audit");
                if is_audit {
                    return Some((name.clone(), cap.clone()));
                }
            }
        }
        None
    }

    /// Render the catalog as the compact JSON object handed to the LLM.
    pub fn to_compact_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `prev_output.type == curr_input.type`.
pub fn compatible(prev_output: &Value, curr_input: &Value) -> bool {
    let prev_type = prev_output.get("type");
    prev_type.is_some() && prev_type == curr_input.get("type")
}

fn catalog_agent(capabilities: &[Capability], record: &AgentRecord) -> CatalogAgent {
    let mut capability_meta = HashMap::new();
    let mut names = Vec::new();
    for cap in capabilities {
        names.push(cap.name.clone());
        capability_meta.insert(
            cap.name.clone(),
            CapabilityMeta {
                description: cap.description.clone(),
                custom_input_handler: cap.custom_input_handler.clone(),
            },
        );
    }
    CatalogAgent {
        capabilities: names,
        capability_meta,
        input_spec: record.manifest.input_spec.clone(),
        output_spec: record.manifest.output_spec.clone(),
    }
}
